//! SNR mixing and PCM16 quantization
//!
//! Signal and noise are combined with weights derived from the *baseline*
//! RMS of their classes rather than the RMS of the individual files, so every
//! file produced for a class at a given SNR uses the same weights:
//!
//! ```text
//! k   = (signal_rms / noise_rms) / 10^(snr / 20)
//! out = signal * 1/(1+k) + noise * k/(1+k)
//! ```

use std::path::Path;

use crate::audio_file::{load_mono_resampled, write_pcm16};
use crate::error::{MixError, MixResult};
use crate::types::{Snr, PCM16_SCALE};

/// Noise weight relative to the signal for a target SNR in dB
pub fn mix_weight(signal_rms: f64, noise_rms: f64, snr_db: f64) -> f64 {
    signal_rms / noise_rms / 10f64.powf(snr_db / 20.0)
}

/// Mix two mono waveforms at the same rate.
///
/// The output has the signal's length; noise beyond its end is dropped and
/// missing noise counts as silence. With [`Snr::Clean`] or no noise the
/// signal is returned unchanged.
pub fn mix(signal: &[f32], noise: Option<&[f32]>, signal_rms: f64, noise_rms: f64, snr: Snr) -> Vec<f32> {
    let (noise, db) = match (noise, snr) {
        (Some(noise), Snr::Db(db)) => (noise, db),
        _ => return signal.to_vec(),
    };

    let k = mix_weight(signal_rms, noise_rms, db);
    let signal_gain = (1.0 / (1.0 + k)) as f32;
    let noise_gain = (k / (1.0 + k)) as f32;

    signal
        .iter()
        .enumerate()
        .map(|(i, &s)| s * signal_gain + noise.get(i).copied().unwrap_or(0.0) * noise_gain)
        .collect()
}

/// Convert float samples to 16-bit PCM.
///
/// Samples are scaled by 32767 and truncated toward zero. Out-of-range
/// values are not clipped: they wrap around like a plain integer cast.
pub fn quantize(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let scaled = s * PCM16_SCALE;
            if scaled.is_finite() {
                scaled as i64 as i16
            } else {
                0
            }
        })
        .collect()
}

/// Noise recording taking part in a mix
#[derive(Debug, Clone, Copy)]
pub struct NoiseSource<'a> {
    pub id: &'a str,
    pub path: &'a Path,
    pub rms: f64,
}

/// Everything needed to render one output file
#[derive(Debug, Clone, Copy)]
pub struct MixJob<'a> {
    pub signal: &'a Path,
    pub signal_rms: f64,
    pub noise: NoiseSource<'a>,
    pub snr: Snr,
    pub dest: &'a Path,
}

/// Load, mix, quantize and write one file. Returns the number of samples written.
pub fn render(job: &MixJob<'_>, sample_rate: u32) -> MixResult<usize> {
    let signal = load_logged(job.signal, sample_rate)?;

    let mixed = match job.snr {
        Snr::Clean => signal,
        Snr::Db(_) => {
            if !(job.noise.rms.is_finite() && job.noise.rms > 0.0) {
                return Err(MixError::DegenerateNoise {
                    id: job.noise.id.to_string(),
                    rms: job.noise.rms,
                });
            }
            let noise = load_logged(job.noise.path, sample_rate)?;
            mix(&signal, Some(&noise), job.signal_rms, job.noise.rms, job.snr)
        }
    };

    let pcm = quantize(&mixed);
    write_pcm16(job.dest, &pcm, sample_rate)?;
    Ok(pcm.len())
}

fn load_logged(path: &Path, sample_rate: u32) -> MixResult<Vec<f32>> {
    load_mono_resampled(path, sample_rate).map_err(|e| {
        log::error!("Cannot load {:?}: {}", path, e);
        e
    })
}
