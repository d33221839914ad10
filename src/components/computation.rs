//! # Computation component: spectrum and magnetic moment estimation.
//!
//! Accumulates voltage blocks from `adc/data` into a ring of `nsig`
//! samples. Each time the ring fills, the component windows the samples,
//! takes a one-sided amplitude spectrum, estimates the dominant coil
//! voltage inside the 5–30 Hz measurement band, converts it to a magnetic
//! moment, and publishes both results.
//!
//! ## Message contract
//! - **in** `adc/data`: `{ "samples": [f64, …], "rate_hz": f64 }`
//! - **in** `calc/command`: `{ "window"?: str, "nsig"?: usize,
//!   "rolling"?: bool }` — changing `nsig` clears the ring.
//! - **out** `fft/data`: `{ "bins": [[hz, volts], …], "window": str }`
//! - **out** `moment/data`: `{ "amplitude_v": f64, "moment_am2": f64 }`
//!
//! In rolling mode the ring keeps its samples and the spectrum slides one
//! block at a time; otherwise the ring is cleared after every spectrum and
//! batches are disjoint.
//!
//! Computation is purely functional with respect to the bus; the physical
//! and virtual variants share this implementation.

use std::collections::VecDeque;
use std::f64::consts::TAU;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{Endpoint, Message};
use crate::components::{sampling, Component, Role, Variant};
use crate::error::ComponentError;

/// Topics owned by the computation role.
pub mod topics {
    /// One-sided amplitude spectra.
    pub const FFT_DATA: &str = "fft/data";
    /// Estimated coil voltage and magnetic moment.
    pub const MOMENT_DATA: &str = "moment/data";
    /// Analysis reconfiguration.
    pub const COMMAND: &str = "calc/command";
}

/// Sense coil winding resistance.
const COIL_RESISTANCE_OHMS: f64 = 90.0;
/// Sense coil turn count.
const COIL_TURNS: f64 = 1000.0;
/// Sense coil cross-section, 0.1 m × 0.1 m.
const COIL_AREA_M2: f64 = 0.01;

/// Measurement band searched for the dominant tone.
const BAND_LOW_HZ: f64 = 5.0;
const BAND_HIGH_HZ: f64 = 30.0;
/// Half-width of the power integration span around the band peak.
const PEAK_SPAN_HZ: f64 = 3.0;

/// Analysis window applied before the spectrum.
///
/// `coherent_gain` undoes the window's amplitude attenuation;
/// `enbw` (equivalent noise bandwidth, in bins) corrects integrated power.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    Rectangular,
    Hann,
    Hamming,
    Blackman,
    BlackmanHarris,
}

impl Window {
    /// Parses a command label; `None` for unknown labels.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "rectangular" => Some(Window::Rectangular),
            "hann" => Some(Window::Hann),
            "hamming" => Some(Window::Hamming),
            "blackman" => Some(Window::Blackman),
            "blackmanharris" => Some(Window::BlackmanHarris),
            _ => None,
        }
    }

    /// The stable label used in commands and published frames.
    pub fn label(&self) -> &'static str {
        match self {
            Window::Rectangular => "rectangular",
            Window::Hann => "hann",
            Window::Hamming => "hamming",
            Window::Blackman => "blackman",
            Window::BlackmanHarris => "blackmanharris",
        }
    }

    /// Mean of the window coefficients.
    pub fn coherent_gain(&self) -> f64 {
        match self {
            Window::Rectangular => 1.0,
            Window::Hann => 0.5,
            Window::Hamming => 0.54,
            Window::Blackman => 0.42,
            Window::BlackmanHarris => 0.42,
        }
    }

    /// Equivalent noise bandwidth in bins.
    pub fn enbw(&self) -> f64 {
        match self {
            Window::Rectangular => 1.0,
            Window::Hann => 1.5,
            Window::Hamming => 1.37,
            Window::Blackman => 1.73,
            Window::BlackmanHarris => 1.71,
        }
    }

    /// Symmetric window coefficients of length `n`.
    pub fn coefficients(&self, n: usize) -> Vec<f64> {
        if n <= 1 {
            return vec![1.0; n];
        }
        let cosine = |i: usize, harmonic: f64| {
            (harmonic * TAU * i as f64 / (n - 1) as f64).cos()
        };
        (0..n)
            .map(|i| match self {
                Window::Rectangular => 1.0,
                Window::Hann => 0.5 - 0.5 * cosine(i, 1.0),
                Window::Hamming => 0.54 - 0.46 * cosine(i, 1.0),
                Window::Blackman => 0.42 - 0.5 * cosine(i, 1.0) + 0.08 * cosine(i, 2.0),
                Window::BlackmanHarris => {
                    0.35875 - 0.48829 * cosine(i, 1.0) + 0.14128 * cosine(i, 2.0)
                        - 0.01168 * cosine(i, 3.0)
                }
            })
            .collect()
    }
}

/// Analysis settings, tunable at runtime over [`topics::COMMAND`].
#[derive(Clone, Debug)]
pub struct ComputationSettings {
    /// Samples per spectrum.
    pub nsig: usize,
    /// Analysis window.
    pub window: Window,
    /// Slide the sample ring instead of clearing it between spectra.
    pub rolling: bool,
}

impl Default for ComputationSettings {
    /// `nsig = 1024`, rectangular window, clearing accumulation.
    fn default() -> Self {
        Self {
            nsig: 1024,
            window: Window::Rectangular,
            rolling: false,
        }
    }
}

/// Iterative radix-2 FFT over `re`/`im` in place. Length must be a power
/// of two.
fn fft_in_place(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    debug_assert!(n.is_power_of_two() && im.len() == n);

    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let ang = -TAU / len as f64;
        let (step_r, step_i) = (ang.cos(), ang.sin());
        for start in (0..n).step_by(len) {
            let (mut w_r, mut w_i) = (1.0, 0.0);
            for k in start..start + len / 2 {
                let (u_r, u_i) = (re[k], im[k]);
                let (x_r, x_i) = (re[k + len / 2], im[k + len / 2]);
                let v_r = x_r * w_r - x_i * w_i;
                let v_i = x_r * w_i + x_i * w_r;
                re[k] = u_r + v_r;
                im[k] = u_i + v_i;
                re[k + len / 2] = u_r - v_r;
                im[k + len / 2] = u_i - v_i;
                let next_r = w_r * step_r - w_i * step_i;
                w_i = w_r * step_i + w_i * step_r;
                w_r = next_r;
            }
        }
        len <<= 1;
    }
}

/// One-sided amplitude spectrum of `samples`, windowed and gain-corrected,
/// zero-padded to the next power of two.
///
/// Returns `(frequency_hz, amplitude_v)` pairs up to Nyquist. Interior bins
/// are doubled so a unit sine on a bin reads 1 V.
fn spectrum(samples: &[f64], rate_hz: f64, window: Window) -> Vec<(f64, f64)> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let coeffs = window.coefficients(n);
    let gain = window.coherent_gain();
    let padded = n.next_power_of_two();

    let mut re = vec![0.0; padded];
    let mut im = vec![0.0; padded];
    for (slot, (sample, coeff)) in re.iter_mut().zip(samples.iter().zip(&coeffs)) {
        *slot = sample * coeff / gain;
    }
    fft_in_place(&mut re, &mut im);

    let half = padded / 2;
    let scale = 1.0 / n as f64;
    (0..=half)
        .map(|k| {
            let mag = (re[k] * re[k] + im[k] * im[k]).sqrt() * scale;
            let mag = if k == 0 || k == half { mag } else { 2.0 * mag };
            (k as f64 * rate_hz / padded as f64, mag)
        })
        .collect()
}

/// Estimated amplitude of the dominant tone inside the measurement band.
///
/// Integrates bin power over ±[`PEAK_SPAN_HZ`] around the band peak and
/// corrects for the window's noise bandwidth. `None` when no bin falls
/// inside the band.
fn band_peak_amplitude(bins: &[(f64, f64)], window: Window) -> Option<f64> {
    if bins.len() < 2 {
        return None;
    }
    let freq_res = bins[1].0 - bins[0].0;

    let peak = bins
        .iter()
        .enumerate()
        .filter(|(_, (hz, _))| (BAND_LOW_HZ..=BAND_HIGH_HZ).contains(hz))
        .max_by(|(_, a), (_, b)| a.1.total_cmp(&b.1))
        .map(|(idx, _)| idx)?;

    let span = (PEAK_SPAN_HZ / freq_res) as usize;
    let lo = peak.saturating_sub(span);
    let hi = (peak + span).min(bins.len());
    let raw_power: f64 = bins[lo..hi].iter().map(|(_, v)| v * v).sum::<f64>() * freq_res;
    Some((raw_power / window.enbw()).sqrt())
}

/// Magnetic moment of the sense coil for a given terminal voltage.
fn moment_from_volts(volts: f64) -> f64 {
    let current_a = volts / COIL_RESISTANCE_OHMS;
    COIL_TURNS * COIL_AREA_M2 * current_a
}

/// The computation component; see the module docs for the message contract.
pub struct ComputationComponent {
    variant: Variant,
    settings: ComputationSettings,
    ring: VecDeque<f64>,
    rate_hz: f64,
}

impl ComputationComponent {
    pub fn new(variant: Variant, settings: ComputationSettings) -> Self {
        Self {
            variant,
            settings,
            ring: VecDeque::new(),
            rate_hz: 1007.0,
        }
    }

    /// Applies a reconfiguration command; changing `nsig` clears the ring.
    ///
    /// A command carrying an unknown field or an unknown window label is
    /// rejected whole.
    fn apply_command(&mut self, payload: &Value) {
        let Some(fields) = payload.as_object() else {
            warn!("analysis command payload is not an object; ignored");
            return;
        };
        if let Some(unknown) = fields
            .keys()
            .find(|k| !matches!(k.as_str(), "window" | "nsig" | "rolling"))
        {
            warn!(field = %unknown, "unknown analysis command field; command ignored");
            return;
        }

        let window = match fields.get("window").and_then(Value::as_str) {
            Some(label) => match Window::parse(label) {
                Some(window) => Some(window),
                None => {
                    warn!(label, "unknown window label; command ignored");
                    return;
                }
            },
            None => None,
        };

        if let Some(window) = window {
            self.settings.window = window;
        }
        if let Some(nsig) = fields.get("nsig").and_then(Value::as_u64) {
            let nsig = nsig as usize;
            if nsig > 0 && nsig != self.settings.nsig {
                self.settings.nsig = nsig;
                self.ring.clear();
            }
        }
        if let Some(rolling) = fields.get("rolling").and_then(Value::as_bool) {
            self.settings.rolling = rolling;
        }
        debug!(
            window = self.settings.window.label(),
            nsig = self.settings.nsig,
            rolling = self.settings.rolling,
            "analysis settings updated"
        );
    }

    /// Folds one voltage block into the ring; returns true when a spectrum
    /// is due.
    fn absorb_block(&mut self, payload: &Value) -> bool {
        let Some(samples) = payload.get("samples").and_then(Value::as_array) else {
            warn!("data frame without samples array; ignored");
            return false;
        };
        if let Some(rate) = payload.get("rate_hz").and_then(Value::as_f64) {
            if rate > 0.0 {
                self.rate_hz = rate;
            }
        }
        self.ring
            .extend(samples.iter().filter_map(Value::as_f64));
        while self.ring.len() > self.settings.nsig {
            self.ring.pop_front();
        }
        self.ring.len() >= self.settings.nsig
    }

    /// Computes the spectrum and moment frames for the current ring.
    fn analyze(&mut self) -> (Message, Option<Message>) {
        let samples: Vec<f64> = self.ring.iter().copied().collect();
        let bins = spectrum(&samples, self.rate_hz, self.settings.window);

        let fft_frame = Message::new(
            topics::FFT_DATA,
            json!({
                "bins": bins.iter().map(|(hz, v)| json!([hz, v])).collect::<Vec<_>>(),
                "window": self.settings.window.label(),
            }),
        );

        let moment_frame = match band_peak_amplitude(&bins, self.settings.window) {
            Some(amplitude_v) => Some(Message::new(
                topics::MOMENT_DATA,
                json!({
                    "amplitude_v": amplitude_v,
                    "moment_am2": moment_from_volts(amplitude_v),
                }),
            )),
            None => {
                warn!(rate_hz = self.rate_hz, "no spectrum bins inside measurement band");
                None
            }
        };

        if !self.settings.rolling {
            self.ring.clear();
        }
        (fft_frame, moment_frame)
    }
}

#[async_trait]
impl Component for ComputationComponent {
    fn name(&self) -> &str {
        "calc"
    }

    fn role(&self) -> Role {
        Role::Computation
    }

    fn variant(&self) -> Variant {
        self.variant
    }

    async fn run(
        &mut self,
        mut endpoint: Endpoint,
        ctx: CancellationToken,
    ) -> Result<(), ComponentError> {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                inbound = endpoint.recv() => {
                    let Some(msg) = inbound else { return Ok(()) };
                    match msg.topic() {
                        sampling::topics::DATA => {
                            if self.absorb_block(msg.payload()) {
                                let (fft_frame, moment_frame) = self.analyze();
                                endpoint.publish(fft_frame).await?;
                                if let Some(frame) = moment_frame {
                                    endpoint.publish(frame).await?;
                                }
                            }
                        }
                        topics::COMMAND => self.apply_command(msg.payload()),
                        other => debug!(topic = other, "unexpected topic ignored"),
                    }
                }
            }
        }
    }
}
