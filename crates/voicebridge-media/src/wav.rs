//! Minimal RIFF/WAVE helpers.

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let slice = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Playback length of a WAV buffer in milliseconds, or `None` if it is not a
/// WAV with both a `fmt ` and a `data` chunk.
///
/// Streaming encoders may leave the data chunk size at 0 or `u32::MAX`; in that
/// case the remainder of the buffer is taken as the data.
pub fn wav_duration_ms(bytes: &[u8]) -> Option<u64> {
    if bytes.get(0..4)? != b"RIFF" || bytes.get(8..12)? != b"WAVE" {
        return None;
    }

    let mut byte_rate = None;
    let mut offset = 12;

    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4)? as usize;
        let body = offset + 8;

        match id {
            b"fmt " => {
                // audio_format(2) channels(2) sample_rate(4) byte_rate(4)
                byte_rate = Some(read_u32(bytes, body + 8)?);
            }
            b"data" => {
                let remaining = bytes.len() - body;
                let data_len = if size == 0 || size > remaining {
                    remaining
                } else {
                    size
                };
                let rate = byte_rate.filter(|r| *r > 0)?;
                return Some(data_len as u64 * 1000 / rate as u64);
            }
            _ => {}
        }

        // Chunks are word-aligned.
        offset = body.checked_add(size)?.checked_add(size % 2)?;
    }

    None
}
