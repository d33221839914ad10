//! # Actuation component: the stepper motor unit.
//!
//! Accepts angular-velocity commands on `motor/command` and reports shaft
//! state on `motor/status`. The physical variant pulses a real stepper
//! through a [`MotorDriver`]; the virtual variant integrates the same step
//! kinematics purely in time, so downstream consumers see identical status
//! traffic either way.
//!
//! ## Message contract
//! - **in** `motor/command`: `{ "omega": f64 }` — signed rad/s; zero parks
//!   the shaft.
//! - **out** `motor/status`: `{ "omega": f64, "theta": f64 }` — one frame
//!   per step and one acknowledging every command.
//! - **out** `status/error`: driver faults; the motor parks until the next
//!   command instead of failing the component.

use std::f64::consts::TAU;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{Endpoint, Message};
use crate::components::{Component, Role, Variant};
use crate::error::ComponentError;

/// Topics owned by the actuation role.
pub mod topics {
    /// Angular-velocity commands.
    pub const COMMAND: &str = "motor/command";
    /// Shaft state reports.
    pub const STATUS: &str = "motor/status";
}

/// Full steps per shaft revolution.
const STEPS_PER_REV: u32 = 200;

/// Hardware seam for the physical variant.
#[async_trait]
pub trait MotorDriver: Send + Sync + 'static {
    /// Pulses the motor one full step in the given direction.
    async fn step(&mut self, forward: bool) -> Result<(), ComponentError>;
}

/// The actuation component; see the module docs for the message contract.
pub struct ActuationComponent {
    driver: Option<Box<dyn MotorDriver>>,
    omega: f64,
    theta: f64,
    faulted: bool,
}

impl ActuationComponent {
    /// Physical variant pulsing a real stepper.
    pub fn physical(driver: Box<dyn MotorDriver>) -> Self {
        Self {
            driver: Some(driver),
            omega: 0.0,
            theta: 0.0,
            faulted: false,
        }
    }

    /// Virtual variant integrating the step kinematics in-process.
    pub fn simulated() -> Self {
        Self {
            driver: None,
            omega: 0.0,
            theta: 0.0,
            faulted: false,
        }
    }

    /// Applies a velocity command. Any command clears a fault park.
    ///
    /// A command carrying an unknown field is rejected whole.
    fn apply_command(&mut self, payload: &Value) {
        let Some(fields) = payload.as_object() else {
            warn!("motor command payload is not an object; ignored");
            return;
        };
        if let Some(unknown) = fields.keys().find(|k| *k != "omega") {
            warn!(field = %unknown, "unknown motor command field; command ignored");
            return;
        }
        let Some(omega) = fields.get("omega").and_then(Value::as_f64) else {
            warn!("motor command without numeric omega; ignored");
            return;
        };
        if !omega.is_finite() {
            warn!(omega, "non-finite omega rejected");
            return;
        }
        self.omega = omega;
        self.faulted = false;
        debug!(omega, "motor velocity set");
    }

    /// Whether the shaft is currently being stepped.
    fn stepping(&self) -> bool {
        self.omega != 0.0 && !self.faulted
    }

    /// Wall time between consecutive steps at the current velocity.
    ///
    /// A parked shaft reports an unbounded period; callers gate stepping on
    /// [`Self::stepping`], so that timer is never actually awaited.
    fn step_period(&self) -> Duration {
        if !self.stepping() {
            return Duration::MAX;
        }
        Duration::from_secs_f64((TAU / STEPS_PER_REV as f64) / self.omega.abs())
    }

    /// Advances the shaft one step, pulsing the driver when present.
    ///
    /// Shaft angle stays in `[0, 2π)`.
    async fn step(&mut self) -> Result<(), ComponentError> {
        if let Some(driver) = &mut self.driver {
            driver.step(self.omega > 0.0).await?;
        }
        let delta = self.omega.signum() * TAU / STEPS_PER_REV as f64;
        self.theta = (self.theta + delta).rem_euclid(TAU);
        Ok(())
    }

    fn status(&self) -> Message {
        Message::new(
            topics::STATUS,
            json!({ "omega": self.omega, "theta": self.theta }),
        )
    }
}

#[async_trait]
impl Component for ActuationComponent {
    fn name(&self) -> &str {
        "motor"
    }

    fn role(&self) -> Role {
        Role::Actuation
    }

    fn variant(&self) -> Variant {
        if self.driver.is_some() {
            Variant::Physical
        } else {
            Variant::Virtual
        }
    }

    async fn run(
        &mut self,
        mut endpoint: Endpoint,
        ctx: CancellationToken,
    ) -> Result<(), ComponentError> {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                inbound = endpoint.recv() => match inbound {
                    Some(msg) if msg.topic() == topics::COMMAND => {
                        self.apply_command(msg.payload());
                        // Every command is acknowledged with a status frame,
                        // including a zero-velocity park.
                        endpoint.publish(self.status()).await?;
                    }
                    Some(msg) => debug!(topic = msg.topic(), "unexpected topic ignored"),
                    None => return Ok(()),
                },
                _ = tokio::time::sleep(self.step_period()), if self.stepping() => {
                    match self.step().await {
                        Ok(()) => endpoint.publish(self.status()).await?,
                        Err(err) => {
                            warn!(error = err.as_label(), "motor fault; shaft parked");
                            self.faulted = true;
                            endpoint
                                .publish(Message::fault(self.name(), err.as_message()))
                                .await?;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{mailbox, Outbox, FAULT_TOPIC};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    const STEP_RAD: f64 = TAU / STEPS_PER_REV as f64;

    fn rig(capacity: usize) -> (Endpoint, super::super::TestFeed, mpsc::Receiver<Message>) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (slot, mb) = mailbox(Arc::from("motor"), capacity);
        (
            Endpoint::new(mb, Outbox::new(out_tx)),
            super::super::TestFeed(slot),
            out_rx,
        )
    }

    #[test]
    fn test_unknown_command_field_rejects_whole_command() {
        let mut motor = ActuationComponent::simulated();
        motor.apply_command(&json!({ "omega": 2.0, "torque": 1 }));
        assert_eq!(motor.omega, 0.0);
        motor.apply_command(&json!({ "omega": "fast" }));
        assert_eq!(motor.omega, 0.0);
        motor.apply_command(&json!({ "omega": f64::NAN }));
        assert_eq!(motor.omega, 0.0);
    }

    #[tokio::test]
    async fn test_step_wraps_angle_into_one_turn() {
        let mut motor = ActuationComponent::simulated();
        motor.omega = 1.0;
        motor.theta = TAU - STEP_RAD / 2.0;
        motor.step().await.unwrap();
        assert!(motor.theta < STEP_RAD, "theta did not wrap: {}", motor.theta);

        motor.omega = -1.0;
        motor.step().await.unwrap();
        assert!(motor.theta > TAU - STEP_RAD, "negative wrap failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_is_acknowledged_and_steps_follow() {
        let (endpoint, feed, mut out_rx) = rig(64);
        let mut motor = ActuationComponent::simulated();
        let ctx = CancellationToken::new();
        let stop = ctx.clone();
        let task = tokio::spawn(async move { motor.run(endpoint, stop).await });

        // One revolution per second: 200 steps/s.
        feed.deliver(Message::new(topics::COMMAND, json!({ "omega": TAU })));

        let ack = out_rx.recv().await.unwrap();
        assert_eq!(ack.topic(), topics::STATUS);
        assert_eq!(ack.payload()["omega"], TAU);
        assert_eq!(ack.payload()["theta"], 0.0);

        for i in 1..=3 {
            let msg = out_rx.recv().await.unwrap();
            assert_eq!(msg.topic(), topics::STATUS);
            let theta = msg.payload()["theta"].as_f64().unwrap();
            assert!((theta - i as f64 * STEP_RAD).abs() < 1e-9);
        }

        ctx.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_omega_steps_backward() {
        let (endpoint, feed, mut out_rx) = rig(64);
        let mut motor = ActuationComponent::simulated();
        let ctx = CancellationToken::new();
        let stop = ctx.clone();
        let task = tokio::spawn(async move { motor.run(endpoint, stop).await });

        feed.deliver(Message::new(topics::COMMAND, json!({ "omega": -TAU })));
        let _ack = out_rx.recv().await.unwrap();

        let msg = out_rx.recv().await.unwrap();
        let theta = msg.payload()["theta"].as_f64().unwrap();
        assert!((theta - (TAU - STEP_RAD)).abs() < 1e-9);

        ctx.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_omega_parks_the_shaft() {
        let (endpoint, feed, mut out_rx) = rig(64);
        let mut motor = ActuationComponent::simulated();
        let ctx = CancellationToken::new();
        let stop = ctx.clone();
        let task = tokio::spawn(async move { motor.run(endpoint, stop).await });

        feed.deliver(Message::new(topics::COMMAND, json!({ "omega": TAU })));
        let _ack = out_rx.recv().await.unwrap();
        let _step = out_rx.recv().await.unwrap();

        feed.deliver(Message::new(topics::COMMAND, json!({ "omega": 0.0 })));
        // Drain step frames until the park acknowledgment arrives.
        loop {
            let msg = out_rx.recv().await.unwrap();
            if msg.payload()["omega"] == 0.0 {
                break;
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(out_rx.try_recv().is_err(), "parked shaft kept stepping");

        ctx.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_fault_parks_until_next_command() {
        struct JammedDriver;

        #[async_trait]
        impl MotorDriver for JammedDriver {
            async fn step(&mut self, _forward: bool) -> Result<(), ComponentError> {
                Err(ComponentError::Driver {
                    detail: "stall detected".into(),
                })
            }
        }

        let (endpoint, feed, mut out_rx) = rig(64);
        let mut motor = ActuationComponent::physical(Box::new(JammedDriver));
        assert_eq!(motor.variant(), Variant::Physical);
        let ctx = CancellationToken::new();
        let stop = ctx.clone();
        let task = tokio::spawn(async move { motor.run(endpoint, stop).await });

        feed.deliver(Message::new(topics::COMMAND, json!({ "omega": TAU })));
        let _ack = out_rx.recv().await.unwrap();

        let msg = out_rx.recv().await.unwrap();
        assert_eq!(msg.topic(), FAULT_TOPIC);
        assert_eq!(msg.payload()["source"], "motor");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(out_rx.try_recv().is_err(), "faulted shaft kept stepping");

        // A fresh command re-arms stepping; the driver jams again.
        feed.deliver(Message::new(topics::COMMAND, json!({ "omega": TAU })));
        let _ack = out_rx.recv().await.unwrap();
        let msg = out_rx.recv().await.unwrap();
        assert_eq!(msg.topic(), FAULT_TOPIC);

        ctx.cancel();
        task.await.unwrap().unwrap();
    }
}
