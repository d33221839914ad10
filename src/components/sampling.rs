//! # Sampling component: the analog acquisition unit.
//!
//! Publishes blocks of voltage readings on `adc/data` and accepts
//! reconfiguration on `adc/command`. The physical variant pulls blocks
//! from an [`AdcDriver`]; the virtual variant synthesizes a three-tone
//! sine mixture with additive noise, paced at the configured rate, with no
//! hardware dependency.
//!
//! ## Message contract
//! - **out** `adc/data`: `{ "samples": [f64, …], "rate_hz": f64 }`
//! - **in** `adc/command`: `{ "nbuf"?: usize, "rate_hz"?: f64 }` — changing
//!   either restarts the acquisition stream (and re-arms one parked by a
//!   fault). A command carrying an unknown field is rejected whole.
//! - **out** `status/error`: acquisition faults; the stream parks until the
//!   next command instead of failing the component.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{Endpoint, Message};
use crate::components::{Component, Role, Variant};
use crate::error::ComponentError;

/// Topics owned by the sampling role.
pub mod topics {
    /// Voltage reading blocks.
    pub const DATA: &str = "adc/data";
    /// Acquisition reconfiguration.
    pub const COMMAND: &str = "adc/command";
}

/// Acquisition settings, tunable at runtime over [`topics::COMMAND`].
#[derive(Clone, Debug)]
pub struct SamplingSettings {
    /// Samples per published block.
    pub nbuf: usize,
    /// Acquisition rate in hertz.
    pub rate_hz: f64,
}

impl Default for SamplingSettings {
    /// `nbuf = 32`, `rate_hz = 1007.0` (the rig's ADC block size and rate).
    fn default() -> Self {
        Self {
            nbuf: 32,
            rate_hz: 1007.0,
        }
    }
}

/// Hardware seam for the physical variant.
#[async_trait]
pub trait AdcDriver: Send + Sync + 'static {
    /// Acquires one block of `nbuf` samples at `rate_hz`, suspending for
    /// the acquisition window.
    async fn acquire(&mut self, nbuf: usize, rate_hz: f64) -> Result<Vec<f64>, ComponentError>;
}

/// Synthetic tones mixed by the virtual variant: (frequency Hz, amplitude V).
const TONES: [(f64, f64); 3] = [(5.0, 1.0), (10.0, 3.0), (20.0, 5.0)];
/// DC offset added to the synthetic mixture.
const OFFSET_V: f64 = 0.5;
/// Noise bound as a fraction of the block's standard deviation.
const NOISE_LEVEL: f64 = 0.2;

/// Phase-continuous three-tone generator backing the virtual variant.
struct ToneSynth {
    phases: [f64; TONES.len()],
}

impl ToneSynth {
    fn new() -> Self {
        Self {
            phases: [0.0; TONES.len()],
        }
    }

    /// Produces one block of `nbuf` samples at `rate_hz`, with noise.
    fn block(&mut self, nbuf: usize, rate_hz: f64) -> Vec<f64> {
        let mut out = Vec::with_capacity(nbuf);
        for _ in 0..nbuf {
            let mut sample = OFFSET_V;
            for (phase, (freq, amp)) in self.phases.iter_mut().zip(TONES) {
                *phase = (*phase + std::f64::consts::TAU * freq / rate_hz)
                    % std::f64::consts::TAU;
                sample += amp * phase.sin();
            }
            out.push(sample);
        }
        add_noise(&mut out, NOISE_LEVEL);
        out
    }
}

/// Adds uniform noise bounded by `level` times the block's standard
/// deviation.
fn add_noise(samples: &mut [f64], level: f64) {
    let n = samples.len() as f64;
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f64>() / n;
    let std = (samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std == 0.0 {
        return;
    }
    let bound = level * std;
    let mut rng = rand::rng();
    for sample in samples.iter_mut() {
        *sample += rng.random_range(-bound..=bound);
    }
}

enum SampleSource {
    Driver(Box<dyn AdcDriver>),
    Synth(ToneSynth),
}

/// The sampling component; see the module docs for the message contract.
pub struct SamplingComponent {
    settings: SamplingSettings,
    source: SampleSource,
    streaming: bool,
}

impl SamplingComponent {
    /// Physical variant driving a real acquisition chip.
    pub fn physical(settings: SamplingSettings, driver: Box<dyn AdcDriver>) -> Self {
        Self {
            settings,
            source: SampleSource::Driver(driver),
            streaming: false,
        }
    }

    /// Virtual variant synthesizing the three-tone test signal.
    pub fn simulated(settings: SamplingSettings) -> Self {
        Self {
            settings,
            source: SampleSource::Synth(ToneSynth::new()),
            streaming: false,
        }
    }

    /// Applies a reconfiguration command; returns true when the acquisition
    /// stream must restart.
    ///
    /// A command carrying an unknown field is rejected whole, leaving the
    /// previous settings in place.
    fn apply_command(&mut self, payload: &Value) -> bool {
        let Some(fields) = payload.as_object() else {
            warn!("sampling command payload is not an object; ignored");
            return false;
        };
        if let Some(unknown) = fields.keys().find(|k| *k != "nbuf" && *k != "rate_hz") {
            warn!(field = %unknown, "unknown sampling command field; command ignored");
            return false;
        }

        let mut restart = false;
        if let Some(nbuf) = fields.get("nbuf").and_then(Value::as_u64) {
            let nbuf = nbuf as usize;
            if nbuf > 0 && nbuf != self.settings.nbuf {
                self.settings.nbuf = nbuf;
                restart = true;
            }
        }
        if let Some(rate) = fields.get("rate_hz").and_then(Value::as_f64) {
            if rate > 0.0 && rate != self.settings.rate_hz {
                self.settings.rate_hz = rate;
                restart = true;
            }
        }
        restart
    }

    /// Produces the next block from the configured source.
    async fn next_block(&mut self) -> Result<Vec<f64>, ComponentError> {
        let (nbuf, rate_hz) = (self.settings.nbuf, self.settings.rate_hz);
        match &mut self.source {
            SampleSource::Driver(driver) => driver.acquire(nbuf, rate_hz).await,
            SampleSource::Synth(synth) => {
                // The synthetic source paces itself at the real block rate.
                tokio::time::sleep(Duration::from_secs_f64(nbuf as f64 / rate_hz)).await;
                Ok(synth.block(nbuf, rate_hz))
            }
        }
    }
}

#[async_trait]
impl Component for SamplingComponent {
    fn name(&self) -> &str {
        "adc"
    }

    fn role(&self) -> Role {
        Role::Sampling
    }

    fn variant(&self) -> Variant {
        match self.source {
            SampleSource::Driver(_) => Variant::Physical,
            SampleSource::Synth(_) => Variant::Virtual,
        }
    }

    async fn run(
        &mut self,
        mut endpoint: Endpoint,
        ctx: CancellationToken,
    ) -> Result<(), ComponentError> {
        self.streaming = true;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                inbound = endpoint.recv() => match inbound {
                    Some(msg) if msg.topic() == topics::COMMAND => {
                        if self.apply_command(msg.payload()) {
                            debug!(
                                nbuf = self.settings.nbuf,
                                rate_hz = self.settings.rate_hz,
                                "acquisition stream restarted"
                            );
                            self.streaming = true;
                        }
                    }
                    Some(msg) => debug!(topic = msg.topic(), "unexpected topic ignored"),
                    None => return Ok(()),
                },
                block = self.next_block(), if self.streaming => match block {
                    Ok(samples) => {
                        let frame = json!({
                            "samples": samples,
                            "rate_hz": self.settings.rate_hz,
                        });
                        endpoint.publish(Message::new(topics::DATA, frame)).await?;
                    }
                    Err(err) => {
                        warn!(error = err.as_label(), "acquisition fault; stream parked");
                        self.streaming = false;
                        endpoint
                            .publish(Message::fault(self.name(), err.as_message()))
                            .await?;
                    }
                },
            }
        }
    }
}
