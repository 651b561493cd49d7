//! Integration tests for FocuserController over the simulated focuser
//!
//! All tests run on a paused tokio clock: simulated motion and the
//! controller's settle polling advance deterministically.

use std::sync::Arc;
use std::time::Duration;

use bcam::config::SimulatedFocuserConfig;
use bcam::error::{MotionError, OpenError, QueryError};
use bcam::hardware::focuser::FocuserController;
use bcam::hardware::simulated::{FocuserCommand, SimulatedFocuser};
use bcam::hardware::MotionMode;
use bcam::limits::PollSettings;

const DEVICE: &str = "/dev/fliusb0";

async fn attached(focuser: &SimulatedFocuser) -> FocuserController {
    let mut controller = FocuserController::new(Arc::new(focuser.clone()));
    controller.open(DEVICE).await.unwrap();
    controller
}

// =============================================================================
// Range checking
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_step_past_upper_limit_issues_no_motion() {
    let focuser = SimulatedFocuser::with_position(6990, 7000);
    let controller = attached(&focuser).await;

    let err = controller.step(20, MotionMode::Blocking).await.unwrap_err();
    assert_eq!(
        err,
        MotionError::OutOfRange {
            target: 7010,
            lower: 0,
            upper: 7000
        }
    );
    assert_eq!(focuser.motion_commands().await, 0);
    assert_eq!(controller.position().await.unwrap(), 6990);
}

#[tokio::test(start_paused = true)]
async fn test_step_below_zero_is_rejected() {
    let focuser = SimulatedFocuser::with_position(100, 7000);
    let controller = attached(&focuser).await;

    let err = controller.step(-200, MotionMode::Async).await.unwrap_err();
    assert!(matches!(
        err,
        MotionError::OutOfRange {
            target: -100,
            lower: 0,
            ..
        }
    ));
    assert_eq!(focuser.motion_commands().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_limits_are_inclusive() {
    let focuser = SimulatedFocuser::with_position(6990, 7000);
    let controller = attached(&focuser).await;

    controller.step(10, MotionMode::Blocking).await.unwrap();
    assert_eq!(controller.position().await.unwrap(), 7000);

    controller.goto(0, MotionMode::Blocking).await.unwrap();
    assert_eq!(controller.position().await.unwrap(), 0);
}

// =============================================================================
// Motion
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_goto_steps_by_difference() {
    let focuser = SimulatedFocuser::new();
    let controller = attached(&focuser).await;
    let start = controller.position().await.unwrap();

    controller.goto(4200, MotionMode::Blocking).await.unwrap();

    assert_eq!(controller.position().await.unwrap(), 4200);
    let commands = focuser.commands().await;
    assert_eq!(
        commands.last(),
        Some(&FocuserCommand::Step {
            steps: 4200 - start,
            mode: MotionMode::Blocking
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_async_step_returns_before_motion_completes() {
    let focuser = SimulatedFocuser::with_position(1000, 7000);
    let controller = attached(&focuser).await;

    controller.step(2000, MotionMode::Async).await.unwrap();
    let right_after = controller.position().await.unwrap();
    assert!(right_after < 3000, "position {} already at target", right_after);

    controller.wait_settled().await.unwrap();
    assert_eq!(controller.position().await.unwrap(), 3000);
}

#[tokio::test(start_paused = true)]
async fn test_blocking_step_waits_when_driver_returns_early() {
    let focuser = SimulatedFocuser::with_position(1000, 7000);
    focuser.set_blocking_returns_early(true);
    let controller = attached(&focuser).await;

    controller.step(1500, MotionMode::Blocking).await.unwrap();

    assert_eq!(focuser.physical_position().await, 2500);
    assert_eq!(controller.position().await.unwrap(), 2500);
}

#[tokio::test(start_paused = true)]
async fn test_blocking_step_times_out_on_slow_motor() {
    let focuser = SimulatedFocuser::from_config(&SimulatedFocuserConfig {
        steps_per_second: 10.0,
        ..Default::default()
    });
    focuser.set_blocking_returns_early(true);
    let mut controller = FocuserController::new(Arc::new(focuser.clone())).with_polling(
        PollSettings::new(Duration::from_millis(10), Duration::from_millis(100)),
    );
    controller.open(DEVICE).await.unwrap();

    let err = controller.step(1000, MotionMode::Blocking).await.unwrap_err();
    match err {
        MotionError::Timeout { elapsed, remaining } => {
            assert!(elapsed >= Duration::from_millis(100));
            assert!(remaining > 0);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_home_returns_to_zero() {
    let focuser = SimulatedFocuser::with_position(5000, 7000);
    let controller = attached(&focuser).await;

    controller.home().await.unwrap();

    assert_eq!(controller.position().await.unwrap(), 0);
    assert!(focuser.commands().await.contains(&FocuserCommand::Home));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_second_controller_cannot_open_busy_device() {
    let focuser = SimulatedFocuser::new();
    let _first = attached(&focuser).await;

    let mut second = FocuserController::new(Arc::new(focuser.clone()));
    let err = second.open(DEVICE).await.unwrap_err();
    assert!(matches!(err, OpenError::Driver { ref device, .. } if device == DEVICE));
    assert!(!second.is_attached());
}

#[tokio::test]
async fn test_failed_open_leaves_controller_detached() {
    let focuser = SimulatedFocuser::new();
    focuser.set_fail_open(true);
    let mut controller = FocuserController::new(Arc::new(focuser.clone()));

    assert!(controller.open(DEVICE).await.is_err());
    assert!(!controller.state().attached);
    assert_eq!(controller.position().await, Err(QueryError::NotAttached));
    assert_eq!(
        controller.step(1, MotionMode::Async).await,
        Err(MotionError::NotAttached)
    );
}

#[tokio::test(start_paused = true)]
async fn test_position_survives_close_and_reopen() {
    let focuser = SimulatedFocuser::new();
    let mut controller = attached(&focuser).await;
    controller.goto(1234, MotionMode::Blocking).await.unwrap();

    controller.close().await.unwrap();
    assert_eq!(controller.position().await, Err(QueryError::NotAttached));
    controller.close().await.unwrap();

    controller.open(DEVICE).await.unwrap();
    assert_eq!(controller.position().await.unwrap(), 1234);
    assert_eq!(
        focuser
            .commands()
            .await
            .iter()
            .filter(|c| matches!(c, FocuserCommand::Close))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_read_failures_surface_as_query_errors() {
    let focuser = SimulatedFocuser::new();
    let controller = attached(&focuser).await;
    focuser.set_fail_reads(true);

    assert!(matches!(
        controller.position().await,
        Err(QueryError::Driver(_))
    ));
    assert!(matches!(
        controller.step(10, MotionMode::Async).await,
        Err(MotionError::Query(QueryError::Driver(_)))
    ));
    assert_eq!(focuser.motion_commands().await, 0);

    let status = controller.status().await;
    assert!(status.attached);
    assert_eq!(status.position, None);
    assert_eq!(status.lower_limit, Some(0));
    assert_eq!(status.temperature_c, None);
}
