use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use bitstream_io::{ByteWrite, ByteWriter, LittleEndian};

const HEADER_SIZE: u32 = 44;

/// RIFF/WAVE writer for interleaved 16-bit PCM
pub struct WAVWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    data_written: u64,
    sample_rate: u32,
    channels: u16,
}

impl<W: Write + Seek> WAVWriter<W> {
    pub fn new(writer: W, sample_rate: u32, channels: u16) -> Self {
        Self {
            writer: BufWriter::new(writer),
            data_written: 0,
            sample_rate,
            channels,
        }
    }

    fn header(&self) -> io::Result<Vec<u8>> {
        // Sizes saturate for streams beyond the 4 GiB RIFF limit
        let data_size = self.data_written.min((u32::MAX - HEADER_SIZE) as u64) as u32;
        let block_align = self.channels * 2;

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        {
            let mut w = ByteWriter::endian(&mut header, LittleEndian);
            w.write_bytes(b"RIFF")?;
            w.write::<u32>(data_size + HEADER_SIZE - 8)?;
            w.write_bytes(b"WAVEfmt ")?;
            w.write::<u32>(16)?;
            w.write::<u16>(1)?; // PCM
            w.write::<u16>(self.channels)?;
            w.write::<u32>(self.sample_rate)?;
            w.write::<u32>(self.sample_rate * block_align as u32)?;
            w.write::<u16>(block_align)?;
            w.write::<u16>(16)?;
            w.write_bytes(b"data")?;
            w.write::<u32>(data_size)?;
        }
        Ok(header)
    }

    /// Write the header with placeholder sizes
    pub fn write_header(&mut self) -> io::Result<()> {
        let header = self.header()?;
        self.writer.write_all(&header)
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> io::Result<()> {
        for &sample in samples {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.data_written += samples.len() as u64 * 2;
        Ok(())
    }

    /// Finish writing and update the RIFF and data sizes
    pub fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let current_pos = self.writer.stream_position()?;

        let header = self.header()?;
        self.writer.seek(SeekFrom::Start(0))?;
        self.writer.write_all(&header)?;

        self.writer.seek(SeekFrom::Start(current_pos))?;
        self.writer.flush()
    }

    /// Get the underlying writer
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }
}
