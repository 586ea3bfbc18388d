//! 配置校验模块
//!
//! 校验规则：
//! - name 非空
//! - decoder / events / gap 范围满足 `validator` 标注的数值约束
//! - 齿形参数合法 (tooth_count > 0, skipped_count < tooth_count, duty_cycle ∈ (0, 1))
//! - 齿形 span 能整除一个发动机循环
//! - 事件角度与 tdc_position 落在 [0, cycle_length)
//! - 至少存在一个主轮边沿
//!
//! 结构性约束 (重复角度、齿间隙一致性等) 由 WaveformBuilder::finalize 负责。

use contracts::{ToothPatternSpec, TriggerBlueprint, TriggerError, Wheel};
use validator::{Validate, ValidationErrors};

const SPAN_EPSILON: f64 = 1e-6;

/// 校验 TriggerBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &TriggerBlueprint) -> Result<(), TriggerError> {
    validate_name(blueprint)?;
    validate_decoder(blueprint)?;
    validate_wheels(blueprint)?;
    validate_events(blueprint)?;
    validate_gap_ranges(blueprint)?;
    validate_tdc(blueprint)?;
    validate_primary_present(blueprint)?;
    Ok(())
}

fn field_error(field: impl Into<String>, errors: ValidationErrors) -> TriggerError {
    TriggerError::config_validation(field, errors.to_string())
}

fn validate_name(blueprint: &TriggerBlueprint) -> Result<(), TriggerError> {
    if blueprint.name.trim().is_empty() {
        return Err(TriggerError::config_validation(
            "name",
            "pattern name cannot be empty",
        ));
    }
    Ok(())
}

fn validate_decoder(blueprint: &TriggerBlueprint) -> Result<(), TriggerError> {
    blueprint
        .decoder
        .validate()
        .map_err(|e| field_error("decoder", e))
}

/// 校验齿形生成参数
fn validate_wheels(blueprint: &TriggerBlueprint) -> Result<(), TriggerError> {
    let cycle = blueprint.pattern.cycle;
    for (idx, spec) in blueprint.pattern.wheels.iter().enumerate() {
        let field = |name: &str| format!("pattern.wheels[{idx}].{name}");
        let (tooth_count, duty_cycle, span) = match spec {
            ToothPatternSpec::EvenlySpaced {
                tooth_count,
                duty_cycle,
                span,
                ..
            } => (*tooth_count, *duty_cycle, *span),
            ToothPatternSpec::SkippedTooth {
                tooth_count,
                skipped_count,
                duty_cycle,
                span,
                ..
            } => {
                if *skipped_count >= *tooth_count {
                    return Err(TriggerError::config_validation(
                        field("skipped_count"),
                        format!(
                            "skipped_count ({skipped_count}) must be < tooth_count ({tooth_count})"
                        ),
                    ));
                }
                (*tooth_count, *duty_cycle, *span)
            }
        };

        if tooth_count == 0 {
            return Err(TriggerError::config_validation(
                field("tooth_count"),
                "tooth_count must be > 0",
            ));
        }
        if !(duty_cycle > 0.0 && duty_cycle < 1.0) {
            return Err(TriggerError::config_validation(
                field("duty_cycle"),
                format!("duty_cycle must be in (0, 1), got {duty_cycle}"),
            ));
        }

        let span = span.unwrap_or_else(|| cycle.primary_revolution());
        let repeats = cycle.cycle_length() / span;
        if !span.is_finite() || span <= 0.0 || (repeats - repeats.round()).abs() > SPAN_EPSILON {
            return Err(TriggerError::config_validation(
                field("span"),
                format!(
                    "span {span} must evenly divide the {} degree cycle",
                    cycle.cycle_length()
                ),
            ));
        }
    }
    Ok(())
}

/// 校验手动事件角度
fn validate_events(blueprint: &TriggerBlueprint) -> Result<(), TriggerError> {
    let cycle_length = blueprint.pattern.cycle.cycle_length();
    for (idx, event) in blueprint.pattern.events.iter().enumerate() {
        event
            .validate()
            .map_err(|e| field_error(format!("pattern.events[{idx}]"), e))?;
        if event.angle >= cycle_length {
            return Err(TriggerError::config_validation(
                format!("pattern.events[{idx}].angle"),
                format!(
                    "angle {} must be < cycle length {cycle_length}",
                    event.angle
                ),
            ));
        }
    }
    Ok(())
}

fn validate_gap_ranges(blueprint: &TriggerBlueprint) -> Result<(), TriggerError> {
    let ranges = [
        ("pattern.sync_gap", blueprint.pattern.sync_gap),
        ("pattern.secondary_sync_gap", blueprint.pattern.secondary_sync_gap),
    ];
    for (field, range) in ranges {
        let Some(range) = range else { continue };
        range.validate().map_err(|e| field_error(field, e))?;
        if range.low > range.high {
            return Err(TriggerError::config_validation(
                field,
                format!("low ({}) must be <= high ({})", range.low, range.high),
            ));
        }
    }
    Ok(())
}

fn validate_tdc(blueprint: &TriggerBlueprint) -> Result<(), TriggerError> {
    let tdc = blueprint.pattern.tdc_position;
    let cycle_length = blueprint.pattern.cycle.cycle_length();
    if !(0.0..cycle_length).contains(&tdc) {
        return Err(TriggerError::config_validation(
            "pattern.tdc_position",
            format!("tdc_position must be in [0, {cycle_length}), got {tdc}"),
        ));
    }
    Ok(())
}

fn validate_primary_present(blueprint: &TriggerBlueprint) -> Result<(), TriggerError> {
    let [primary, _] = blueprint.expected_edge_counts();
    if primary == 0 {
        return Err(TriggerError::config_validation(
            "pattern",
            format!("no {} wheel edges configured", Wheel::Primary.as_str()),
        ));
    }
    Ok(())
}
