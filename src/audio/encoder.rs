use super::format::AudioFormat;
use crate::session::Artifact;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

pub const WAV_MIME: &str = "audio/wav";

/// Assemble the buffered capture fragments into a single in-memory WAV
/// artifact, in arrival order.
pub fn encode_wav(chunks: &[Vec<f32>], format: AudioFormat) -> Result<Artifact, hound::Error> {
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: AudioFormat::BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)?;

    for chunk in chunks {
        for &sample in chunk {
            // Convert f32 (-1.0 to 1.0) to i16
            let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(amplitude)?;
        }
    }

    writer.finalize()?;

    Ok(Artifact {
        bytes: cursor.into_inner(),
        mime: WAV_MIME,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_fragment_order() {
        let format = AudioFormat {
            sample_rate: 8_000,
            channels: 1,
        };
        let chunks = vec![vec![0.0, 0.5], vec![-0.5, 1.0], vec![-2.0]];

        let artifact = encode_wav(&chunks, format).unwrap();
        assert_eq!(artifact.mime, WAV_MIME);

        let reader = WavReader::new(Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 8_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);

        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], (0.5 * i16::MAX as f32) as i16);
        assert_eq!(samples[2], (-0.5 * i16::MAX as f32) as i16);
        assert_eq!(samples[3], i16::MAX);
        // out-of-range input clamps instead of wrapping
        assert_eq!(samples[4], -i16::MAX);
    }

    #[test]
    fn test_empty_capture() {
        let artifact = encode_wav(&[], AudioFormat::default()).unwrap();
        assert!(!artifact.is_empty());

        let reader = WavReader::new(Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(reader.len(), 0);
    }
}
