use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Result, bail};
use bitstream_io::{ByteRead, ByteReader, LittleEndian};

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read>,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path_str = input_path.as_ref().to_string_lossy();
        let is_pipe = path_str == "-";

        let reader: Box<dyn Read> = if is_pipe {
            Box::new(io::stdin().lock())
        } else {
            let file = File::open(input_path)?;
            Box::new(BufReader::new(file))
        };

        Ok(Self { reader })
    }

    /// Fills `buffer` as far as the input allows. Returns the bytes read;
    /// fewer than requested only at end of input.
    pub fn read_full(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.reader.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Format of the PCM input, from a WAV header or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: usize,
    pub sample_rate: u32,
}

/// Reads interleaved 16-bit PCM frames from a RIFF/WAVE file or raw
/// little-endian samples.
pub struct PcmReader {
    input: InputReader,
    format: PcmFormat,
    /// Bytes read while probing for a header that belong to the samples.
    pending: Vec<u8>,
    /// Sample bytes left in the WAV data chunk.
    remaining: Option<u64>,
}

impl PcmReader {
    /// Opens `path`, taking the format from its WAV header when it has one
    /// and from `raw_format` otherwise.
    pub fn open<P: AsRef<Path>>(path: P, raw_format: PcmFormat) -> Result<Self> {
        let mut input = InputReader::new(path)?;
        let mut magic = [0u8; 4];
        let probed = input.read_full(&mut magic)?;

        if probed == 4 && &magic == b"RIFF" {
            let (format, data_len) = parse_wav_header(&mut input)?;
            log::debug!(
                "WAV input: {} channels at {} Hz, {data_len} data bytes",
                format.channels,
                format.sample_rate
            );
            return Ok(Self {
                input,
                format,
                pending: Vec::new(),
                remaining: Some(data_len as u64),
            });
        }

        log::debug!(
            "Raw s16le input: {} channels at {} Hz",
            raw_format.channels,
            raw_format.sample_rate
        );
        Ok(Self {
            input,
            format: raw_format,
            pending: magic[..probed].to_vec(),
            remaining: None,
        })
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Reads the next frame of `samples_per_channel` interleaved samples.
    ///
    /// A short final frame is padded with zeros. Returns `None` at end of
    /// input, otherwise the frame and how many samples per channel are real.
    pub fn read_frame(&mut self, samples_per_channel: usize) -> Result<Option<(Vec<i16>, usize)>> {
        let frame_bytes = samples_per_channel * self.format.channels * 2;
        let mut want = frame_bytes;
        if let Some(remaining) = self.remaining {
            want = want.min(remaining as usize);
        }

        let mut bytes = vec![0u8; frame_bytes];
        let from_pending = self.pending.len().min(want);
        bytes[..from_pending].copy_from_slice(&self.pending[..from_pending]);
        self.pending.drain(..from_pending);
        let got = from_pending + self.input.read_full(&mut bytes[from_pending..want])?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= got as u64;
        }
        if got == 0 {
            return Ok(None);
        }

        let block = self.format.channels * 2;
        if got % block != 0 {
            log::warn!("Input ends inside a sample block, dropping {} bytes", got % block);
        }
        let pcm = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        Ok(Some((pcm, got / block)))
    }
}

/// Parses a RIFF/WAVE header after the `RIFF` tag up to the start of the
/// sample data. Returns the format and the data chunk length.
fn parse_wav_header<R: Read>(reader: R) -> Result<(PcmFormat, u32)> {
    let mut r = ByteReader::endian(reader, LittleEndian);
    let _riff_size: u32 = r.read()?;
    let mut wave = [0u8; 4];
    r.read_bytes(&mut wave)?;
    if &wave != b"WAVE" {
        bail!("RIFF file is not WAVE");
    }

    let mut format = None;
    loop {
        let mut id = [0u8; 4];
        r.read_bytes(&mut id)?;
        let size: u32 = r.read()?;
        match &id {
            b"fmt " => {
                if size < 16 {
                    bail!("WAV fmt chunk too short: {size} bytes");
                }
                let tag: u16 = r.read()?;
                let channels: u16 = r.read()?;
                let sample_rate: u32 = r.read()?;
                let _byte_rate: u32 = r.read()?;
                let _block_align: u16 = r.read()?;
                let bits: u16 = r.read()?;
                // WAVE_FORMAT_EXTENSIBLE carries its PCM subformat further on
                if (tag != 1 && tag != 0xFFFE) || bits != 16 {
                    bail!("Only 16-bit PCM WAV input is supported (format {tag}, {bits} bits)");
                }
                r.skip(size - 16 + (size & 1))?;
                format = Some(PcmFormat {
                    channels: channels as usize,
                    sample_rate,
                });
            }
            b"data" => {
                let Some(format) = format else {
                    bail!("WAV data chunk precedes the fmt chunk");
                };
                return Ok((format, size));
            }
            _ => {
                log::trace!("Skipping WAV chunk {:?}", String::from_utf8_lossy(&id));
                r.skip(size + (size & 1))?;
            }
        }
    }
}
