//! Augmented reality overlay alignment.
//!
//! The viewer composites the rendered image over its webcam stream using four
//! float settings. The presenter nudges them in fixed steps, keeping offsets
//! within one image width and scales within the configured bounds.

use tracing::debug;
use viewlink_core::{Mode, OverlayCommand, PresenterError, SessionId, SettingKey, SettingValue};
use viewlink_transport::SessionTransport;

use crate::state::EngineState;

/// Add `delta` to a float setting, clamp the sum to `[min, max]`, write it
/// back and return it.
pub fn increment_setting_clamped(
    transport: &mut dyn SessionTransport,
    id: SessionId,
    key: SettingKey,
    delta: f32,
    min: f32,
    max: f32,
) -> Result<f32, PresenterError> {
    let current = transport.setting_f32(id, key)?;
    let next = (current + delta).max(min).min(max);
    transport.set_setting(id, key, SettingValue::F32(next))?;
    debug!("Session[{}] {:?}: {} → {}", id, key, current, next);
    Ok(next)
}

/// Apply an overlay command. Ignored unless the session is in augmented
/// reality mode.
pub fn execute(
    state: &EngineState,
    transport: &mut dyn SessionTransport,
    id: SessionId,
    command: OverlayCommand,
) -> Result<bool, PresenterError> {
    if transport.session_mode(id)? != Some(Mode::AugmentedReality) {
        return Ok(false);
    }

    let overlay = state.config.overlay;
    match command {
        OverlayCommand::OffsetLeft => offset(transport, state, id, SettingKey::OverlayOffsetX, -overlay.offset_step)?,
        OverlayCommand::OffsetRight => offset(transport, state, id, SettingKey::OverlayOffsetX, overlay.offset_step)?,
        OverlayCommand::OffsetDown => offset(transport, state, id, SettingKey::OverlayOffsetY, -overlay.offset_step)?,
        OverlayCommand::OffsetUp => offset(transport, state, id, SettingKey::OverlayOffsetY, overlay.offset_step)?,
        OverlayCommand::ResetOffsetX => reset(transport, id, SettingKey::OverlayOffsetX, 0.0)?,
        OverlayCommand::ResetOffsetY => reset(transport, id, SettingKey::OverlayOffsetY, 0.0)?,
        OverlayCommand::ShrinkX => scale(transport, state, id, SettingKey::OverlayScaleX, -overlay.scale_step)?,
        OverlayCommand::GrowX => scale(transport, state, id, SettingKey::OverlayScaleX, overlay.scale_step)?,
        OverlayCommand::ShrinkY => scale(transport, state, id, SettingKey::OverlayScaleY, -overlay.scale_step)?,
        OverlayCommand::GrowY => scale(transport, state, id, SettingKey::OverlayScaleY, overlay.scale_step)?,
        OverlayCommand::ResetScaleX => reset(transport, id, SettingKey::OverlayScaleX, 1.0)?,
        OverlayCommand::ResetScaleY => reset(transport, id, SettingKey::OverlayScaleY, 1.0)?,
    };
    Ok(true)
}

/// Offsets move at most one augmented reality image width either way.
fn offset(
    transport: &mut dyn SessionTransport,
    state: &EngineState,
    id: SessionId,
    key: SettingKey,
    delta: f32,
) -> Result<f32, PresenterError> {
    let limit = f32::from(state.augmented.image.width);
    increment_setting_clamped(transport, id, key, delta, -limit, limit)
}

fn scale(
    transport: &mut dyn SessionTransport,
    state: &EngineState,
    id: SessionId,
    key: SettingKey,
    delta: f32,
) -> Result<f32, PresenterError> {
    let overlay = state.config.overlay;
    increment_setting_clamped(transport, id, key, delta, overlay.scale_min, overlay.scale_max)
}

fn reset(
    transport: &mut dyn SessionTransport,
    id: SessionId,
    key: SettingKey,
    value: f32,
) -> Result<f32, PresenterError> {
    transport.set_setting(id, key, SettingValue::F32(value))?;
    debug!("Session[{}] {:?} reset to {}", id, key, value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rig, small_config};
    use proptest::prelude::*;
    use viewlink_core::Resolution;
    use viewlink_transport::{LoopbackTransport, ViewerProfile};

    #[test]
    fn offsets_stop_at_one_image_width() {
        let profile = ViewerProfile { ar_image: Resolution::new(4, 4), ..Default::default() };
        let mut r = rig(small_config(), profile);
        r.activate(Mode::AugmentedReality);

        for _ in 0..10 {
            execute(&r.state, &mut r.transport, r.id, OverlayCommand::OffsetLeft).unwrap();
        }
        assert_eq!(r.transport.setting_f32(r.id, SettingKey::OverlayOffsetX).unwrap(), -4.0);
        execute(&r.state, &mut r.transport, r.id, OverlayCommand::OffsetUp).unwrap();
        assert_eq!(r.transport.setting_f32(r.id, SettingKey::OverlayOffsetY).unwrap(), 1.0);

        execute(&r.state, &mut r.transport, r.id, OverlayCommand::ResetOffsetX).unwrap();
        assert_eq!(r.transport.setting_f32(r.id, SettingKey::OverlayOffsetX).unwrap(), 0.0);
    }

    #[test]
    fn scale_respects_configured_minimum() {
        let mut r = rig(small_config(), ViewerProfile::default());
        r.activate(Mode::AugmentedReality);

        for _ in 0..150 {
            execute(&r.state, &mut r.transport, r.id, OverlayCommand::ShrinkY).unwrap();
        }
        let y = r.transport.setting_f32(r.id, SettingKey::OverlayScaleY).unwrap();
        assert!((y - 0.01).abs() < 1e-6, "scale y = {y}");
        execute(&r.state, &mut r.transport, r.id, OverlayCommand::GrowX).unwrap();
        let x = r.transport.setting_f32(r.id, SettingKey::OverlayScaleX).unwrap();
        assert!((x - 1.01).abs() < 1e-6, "scale x = {x}");

        execute(&r.state, &mut r.transport, r.id, OverlayCommand::ResetScaleY).unwrap();
        assert_eq!(r.transport.setting_f32(r.id, SettingKey::OverlayScaleY).unwrap(), 1.0);
    }

    #[test]
    fn ignored_outside_augmented_reality() {
        let mut r = rig(small_config(), ViewerProfile::default());
        r.activate(Mode::Standard);
        assert!(!execute(&r.state, &mut r.transport, r.id, OverlayCommand::GrowX).unwrap());
        assert_eq!(r.transport.setting_f32(r.id, SettingKey::OverlayScaleX).unwrap(), 1.0);
    }

    proptest! {
        #[test]
        fn clamped_increment_stays_bounded_and_moves_with_delta(
            start in -50.0f32..50.0,
            deltas in proptest::collection::vec(-5.0f32..5.0, 1..20),
            lo in -20.0f32..0.0,
            span in 0.0f32..40.0,
        ) {
            let hi = lo + span;
            let mut t = LoopbackTransport::default();
            let id = t.open_viewer_session();
            t.set_setting(id, SettingKey::OverlayOffsetX, SettingValue::F32(start)).unwrap();

            let mut previous = start;
            for delta in deltas {
                let next = increment_setting_clamped(&mut t, id, SettingKey::OverlayOffsetX, delta, lo, hi).unwrap();
                prop_assert!(next >= lo && next <= hi);
                prop_assert_eq!(t.setting_f32(id, SettingKey::OverlayOffsetX).unwrap(), next);
                let inside = previous >= lo && previous <= hi;
                if inside && delta > 0.0 {
                    prop_assert!(next >= previous);
                }
                if inside && delta < 0.0 {
                    prop_assert!(next <= previous);
                }
                previous = next;
            }
        }
    }
}
