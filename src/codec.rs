//! Audio frame codec
//!
//! Converts raw PCM between the byte form captured locally and the base64
//! transport form carried in JSON payloads, and packages buffered PCM into
//! a WAV container for the transcription endpoint.

use crate::protocol::Result;
use base64::engine::general_purpose;
use base64::Engine;

/// Encode one audio frame as a transport unit (standard base64, no line
/// wrapping).
pub fn encode_transport_unit(frame: &[u8]) -> String {
    general_purpose::STANDARD.encode(frame)
}

/// Decode a transport unit back into raw bytes.
pub fn decode_transport_unit(unit: &str) -> Result<Vec<u8>> {
    Ok(general_purpose::STANDARD.decode(unit)?)
}

/// Wrap raw 16-bit PCM in a canonical 44-byte WAV container.
///
/// All multi-byte header fields are little-endian, format tag 1 (integer
/// PCM). Empty input yields a header-only buffer.
pub fn synthesize_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample = 16u16;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
    let block_align = channels * bits_per_sample / 8;
    let data_size = pcm.len() as u32;
    let file_size = 36 + data_size;

    let mut wav = Vec::with_capacity(44 + pcm.len());

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    wav.extend_from_slice(pcm);

    wav
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientError;

    #[test]
    fn test_transport_unit_round_trip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![1, 2, 3],
            (0u8..=255).collect(),
            vec![0x80; 3201], // odd length, high bit set
        ];
        for bytes in cases {
            let unit = encode_transport_unit(&bytes);
            assert!(!unit.contains('\n'));
            assert_eq!(decode_transport_unit(&unit).unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        let err = decode_transport_unit("not valid base64!").unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn test_wav_container_layout() {
        let pcm: Vec<u8> = (0u8..200).collect();
        let wav = synthesize_wav(&pcm, 16_000, 1);

        assert_eq!(wav.len(), 44 + pcm.len());
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        // format tag 1, mono, 16 kHz, 16-bit, little-endian
        assert_eq!(u16::from_le_bytes([wav[20], wav[21]]), 1);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(
            u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]),
            16_000
        );
        assert_eq!(
            u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]),
            32_000
        );
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 16);
        assert_eq!(
            u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]) as usize,
            pcm.len()
        );
        assert_eq!(&wav[44..], &pcm[..]);
    }

    #[test]
    fn test_wav_container_empty_input() {
        let wav = synthesize_wav(&[], 16_000, 1);
        assert_eq!(wav.len(), 44);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn test_wav_container_parses() {
        let samples: Vec<i16> = (0..320).map(|i| (i * 50) as i16).collect();
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = synthesize_wav(&pcm, 16_000, 1);

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }
}
