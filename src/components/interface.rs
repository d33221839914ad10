//! # Interface component: the operator front panel.
//!
//! A two-line display plus two buttons and a dial. The panel shows either
//! the estimated magnetic moment or the dominant spectral line, cycled by
//! the mode button; the power button blanks the display. Dial turns
//! retune the analysis depth. The physical variant talks to real hardware
//! through a [`FrontPanel`] seam polled on a fixed cadence; the virtual
//! variant has no input source and consumes display traffic silently.
//!
//! ## Message contract
//! - **in** `moment/data`, `fft/data`: display refresh.
//! - **out** `ui/input`: `{ "control": "mode" | "power" }` — one frame per
//!   button press, published whether or not the display reacts.
//! - **out** `calc/command`: `{ "nsig": usize }` — dial turns.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{Endpoint, Message};
use crate::components::{computation, Component, Role, Variant};
use crate::error::ComponentError;

/// Topics owned by the interface role.
pub mod topics {
    /// Operator button events.
    pub const INPUT: &str = "ui/input";
}

/// Input polling cadence for physical panels.
const POLL_PERIOD: Duration = Duration::from_millis(100);

/// One operator action read from the panel hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelInput {
    /// Mode button: cycle the display view.
    Mode,
    /// Power button: blank or wake the display.
    Power,
    /// Dial settled on a new analysis depth.
    Dial(usize),
}

/// Hardware seam for the physical variant.
#[async_trait]
pub trait FrontPanel: Send + Sync + 'static {
    /// Writes both display lines.
    async fn render(&mut self, top: &str, bottom: &str) -> Result<(), ComponentError>;

    /// Reads at most one pending operator action.
    async fn poll(&mut self) -> Result<Option<PanelInput>, ComponentError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum View {
    BField,
    Spectrum,
    Off,
}

/// The interface component; see the module docs for the message contract.
pub struct InterfaceComponent {
    panel: Option<Box<dyn FrontPanel>>,
    view: View,
    peak_freq_hz: f64,
    peak_mag_v: f64,
    moment_am2: f64,
}

impl InterfaceComponent {
    /// Physical variant driving a real panel.
    pub fn physical(panel: Box<dyn FrontPanel>) -> Self {
        Self {
            panel: Some(panel),
            view: View::BField,
            peak_freq_hz: 0.0,
            peak_mag_v: 0.0,
            moment_am2: 0.0,
        }
    }

    /// Virtual variant: consumes display traffic, produces no input.
    pub fn simulated() -> Self {
        Self {
            panel: None,
            view: View::BField,
            peak_freq_hz: 0.0,
            peak_mag_v: 0.0,
            moment_am2: 0.0,
        }
    }

    /// Folds one display frame into the panel state.
    fn absorb(&mut self, msg: &Message) {
        match msg.topic() {
            computation::topics::FFT_DATA => {
                if let Some((hz, v)) = strongest_bin(msg.payload()) {
                    self.peak_freq_hz = hz;
                    self.peak_mag_v = v;
                } else {
                    warn!("spectrum frame without usable bins; ignored");
                }
            }
            computation::topics::MOMENT_DATA => {
                if let Some(moment) = msg.payload().get("moment_am2").and_then(Value::as_f64) {
                    self.moment_am2 = moment;
                } else {
                    warn!("moment frame without moment_am2; ignored");
                }
            }
            other => debug!(topic = other, "unexpected topic ignored"),
        }
    }

    /// Reacts to one operator action, publishing its bus traffic.
    async fn handle_input(
        &mut self,
        input: PanelInput,
        endpoint: &Endpoint,
    ) -> Result<(), ComponentError> {
        match input {
            PanelInput::Mode => {
                // A blanked display ignores mode, but the event still goes out.
                self.view = match self.view {
                    View::BField => View::Spectrum,
                    View::Spectrum => View::BField,
                    View::Off => View::Off,
                };
                endpoint
                    .publish(Message::new(topics::INPUT, json!({ "control": "mode" })))
                    .await?;
            }
            PanelInput::Power => {
                self.view = if self.view == View::Off {
                    View::BField
                } else {
                    View::Off
                };
                endpoint
                    .publish(Message::new(topics::INPUT, json!({ "control": "power" })))
                    .await?;
            }
            PanelInput::Dial(nsig) => {
                endpoint
                    .publish(Message::new(
                        computation::topics::COMMAND,
                        json!({ "nsig": nsig }),
                    ))
                    .await?;
            }
        }
        Ok(())
    }

    /// The two display lines for the current view.
    fn lines(&self) -> (String, String) {
        match self.view {
            View::Off => (String::new(), String::new()),
            View::BField => (
                "B-field".to_string(),
                format!("M: {:.6}Am2", self.moment_am2),
            ),
            View::Spectrum => (
                format!("Freq: {:.2}Hz", self.peak_freq_hz),
                format!("Mag: {:.6}V", self.peak_mag_v),
            ),
        }
    }

    /// Redraws the panel when one is attached.
    ///
    /// A render fault is reported on the bus but does not park the
    /// component; input handling keeps working without the display.
    async fn render(&mut self, endpoint: &Endpoint) -> Result<(), ComponentError> {
        let (top, bottom) = self.lines();
        let Some(panel) = &mut self.panel else {
            return Ok(());
        };
        if let Err(err) = panel.render(&top, &bottom).await {
            warn!(error = err.as_label(), "panel render fault");
            endpoint
                .publish(Message::fault("panel", err.as_message()))
                .await?;
        }
        Ok(())
    }
}

/// Picks the strongest `[hz, volts]` pair out of a spectrum frame.
fn strongest_bin(payload: &Value) -> Option<(f64, f64)> {
    payload
        .get("bins")?
        .as_array()?
        .iter()
        .filter_map(|bin| {
            let hz = bin.get(0)?.as_f64()?;
            let v = bin.get(1)?.as_f64()?;
            Some((hz, v))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

#[async_trait]
impl Component for InterfaceComponent {
    fn name(&self) -> &str {
        "panel"
    }

    fn role(&self) -> Role {
        Role::Interface
    }

    fn variant(&self) -> Variant {
        if self.panel.is_some() {
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
        let mut ticker = tokio::time::interval(POLL_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                inbound = endpoint.recv() => match inbound {
                    Some(msg) => {
                        self.absorb(&msg);
                        self.render(&endpoint).await?;
                    }
                    None => return Ok(()),
                },
                _ = ticker.tick(), if self.panel.is_some() => {
                    let polled = match &mut self.panel {
                        Some(panel) => panel.poll().await,
                        None => Ok(None),
                    };
                    match polled {
                        Ok(Some(input)) => {
                            debug!(?input, "panel input");
                            self.handle_input(input, &endpoint).await?;
                            self.render(&endpoint).await?;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(error = err.as_label(), "panel poll fault");
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
