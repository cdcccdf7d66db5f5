//! WAV container wrapping for raw PCM speech output.
//!
//! TTS providers stream raw little-endian PCM tagged `audio/L<bits>;
//! rate=<hz>`. Browsers and players need a container, so the pipeline
//! synthesizes a 44-byte RIFF/WAVE/fmt/data header (mono) in front of the
//! sample data.

/// PCM parameters recovered from an `audio/L<bits>; rate=<hz>` MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub bits_per_sample: u16,
    pub sample_rate: u32,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            bits_per_sample: 16,
            sample_rate: 24_000,
        }
    }
}

/// Parse the PCM parameters out of a raw-PCM MIME type. `None` for anything
/// that is not `audio/L...`; unparsable numbers fall back to 16-bit/24 kHz.
pub fn parse_pcm_mime(mime: &str) -> Option<PcmFormat> {
    let rest = mime.strip_prefix("audio/L")?;
    let mut format = PcmFormat::default();

    let bits_part: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if let Ok(bits) = bits_part.parse() {
        format.bits_per_sample = bits;
    }

    for param in mime.split(';').skip(1) {
        if let Some(rate) = param.trim().strip_prefix("rate=") {
            if let Ok(rate) = rate.parse() {
                format.sample_rate = rate;
            }
        }
    }

    Some(format)
}

/// Prepend a 44-byte mono WAV header to raw PCM samples.
pub fn wrap_pcm_in_wav(pcm: &[u8], format: PcmFormat) -> Vec<u8> {
    const CHANNELS: u16 = 1;
    let bytes_per_sample = u32::from(format.bits_per_sample / 8);
    let byte_rate = format.sample_rate * u32::from(CHANNELS) * bytes_per_sample;
    let block_align = CHANNELS * (format.bits_per_sample / 8);
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}
