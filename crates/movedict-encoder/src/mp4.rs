//! Progressive MP4 muxer for H.264 files
//!
//! Layout is `ftyp`, one `mdat` that grows as samples are appended, and a
//! `moov` written on finish. Every sample is its own chunk, so the sample
//! tables stay trivial. Parameter sets are moved out of the samples and into
//! the `avcC` record.

use crate::encoder::EncodedFrame;
use crate::nal::{nal_type, unit_type};
use bytes::{BufMut, BytesMut};
use movedict_core::{Error, Result};
use std::io::{Seek, SeekFrom, Write};
use tracing::debug;

/// Media ticks per frame; the timescale is derived from the frame rate
const SAMPLE_DELTA: u32 = 1000;

/// Size of the `mdat` header using a 64-bit largesize
const MDAT_HEADER_LEN: u64 = 16;

/// Progressive MP4 writer for a single H.264 video track
pub struct Mp4Writer<W: Write + Seek> {
    writer: W,
    width: u32,
    height: u32,
    timescale: u32,
    mdat_start: u64,
    position: u64,
    sps: Vec<u8>,
    pps: Vec<u8>,
    sample_sizes: Vec<u32>,
    chunk_offsets: Vec<u64>,
    sync_samples: Vec<u32>,
}

impl<W: Write + Seek> Mp4Writer<W> {
    /// Start a new file: writes `ftyp` and the `mdat` header
    pub fn new(mut writer: W, width: u32, height: u32, fps: f64) -> Result<Self> {
        let timescale = (fps * SAMPLE_DELTA as f64).round();
        if !(timescale >= 1.0 && timescale <= u32::MAX as f64) {
            return Err(Error::Container(format!("unsupported frame rate {}", fps)));
        }

        let mut head = BytesMut::new();
        write_ftyp(&mut head);
        let mdat_start = head.len() as u64;
        head.put_u32(1); // size lives in largesize
        head.put_slice(b"mdat");
        head.put_u64(MDAT_HEADER_LEN); // patched on finish

        writer.write_all(&head)?;

        Ok(Self {
            writer,
            width,
            height,
            timescale: timescale as u32,
            mdat_start,
            position: head.len() as u64,
            sps: Vec::new(),
            pps: Vec::new(),
            sample_sizes: Vec::new(),
            chunk_offsets: Vec::new(),
            sync_samples: Vec::new(),
        })
    }

    /// Append one access unit as the next sample
    pub fn write_sample(&mut self, frame: &EncodedFrame) -> Result<()> {
        let mut sample = BytesMut::new();
        for nal in &frame.nals {
            match unit_type(nal) {
                nal_type::SPS => {
                    if self.sps.is_empty() {
                        self.sps = nal.clone();
                    }
                }
                nal_type::PPS => {
                    if self.pps.is_empty() {
                        self.pps = nal.clone();
                    }
                }
                nal_type::AUD => {}
                _ => {
                    sample.put_u32(nal.len() as u32);
                    sample.put_slice(nal);
                }
            }
        }

        let size = u32::try_from(sample.len())
            .map_err(|_| Error::Container("sample larger than 4 GiB".to_string()))?;

        self.writer.write_all(&sample)?;
        self.chunk_offsets.push(self.position);
        self.sample_sizes.push(size);
        if frame.is_keyframe {
            self.sync_samples.push(self.sample_sizes.len() as u32);
        }
        self.position += size as u64;

        Ok(())
    }

    /// Number of samples written so far
    pub fn sample_count(&self) -> u32 {
        self.sample_sizes.len() as u32
    }

    /// Patch the `mdat` size, append `moov` and hand back the writer
    pub fn finish(mut self) -> Result<W> {
        if self.sample_sizes.is_empty() {
            return Err(Error::Container("no samples were written".to_string()));
        }
        if self.sps.is_empty() || self.pps.is_empty() {
            return Err(Error::Container(
                "stream carried no SPS/PPS parameter sets".to_string(),
            ));
        }

        let mdat_size = self.position - self.mdat_start;
        self.writer.seek(SeekFrom::Start(self.mdat_start + 8))?;
        self.writer.write_all(&mdat_size.to_be_bytes())?;
        self.writer.seek(SeekFrom::Start(self.position))?;

        let mut moov = BytesMut::new();
        self.write_moov(&mut moov)?;
        self.writer.write_all(&moov)?;
        self.writer.flush()?;

        debug!(
            "MP4 finalized: {} samples, {} sync, mdat {} bytes",
            self.sample_sizes.len(),
            self.sync_samples.len(),
            mdat_size
        );

        Ok(self.writer)
    }

    fn duration(&self) -> Result<u32> {
        u32::try_from(self.sample_sizes.len() as u64 * SAMPLE_DELTA as u64)
            .map_err(|_| Error::Container("clip too long for 32-bit duration".to_string()))
    }

    fn write_moov(&self, buf: &mut BytesMut) -> Result<()> {
        let duration = self.duration()?;
        let mut content = BytesMut::new();
        self.write_mvhd(&mut content, duration);
        self.write_trak(&mut content, duration);
        write_box(buf, b"moov", &content);
        Ok(())
    }

    fn write_mvhd(&self, buf: &mut BytesMut, duration: u32) {
        let mut content = BytesMut::new();
        put_full_box_header(&mut content, 0, 0);
        content.put_u32(0); // creation time
        content.put_u32(0); // modification time
        content.put_u32(self.timescale);
        content.put_u32(duration);
        content.put_u32(0x00010000); // rate (1.0)
        content.put_u16(0x0100); // volume (1.0)
        content.put_u16(0); // reserved
        content.put_u64(0); // reserved
        put_identity_matrix(&mut content);
        for _ in 0..6 {
            content.put_u32(0); // pre-defined
        }
        content.put_u32(2); // next track ID
        write_box(buf, b"mvhd", &content);
    }

    fn write_trak(&self, buf: &mut BytesMut, duration: u32) {
        let mut content = BytesMut::new();
        self.write_tkhd(&mut content, duration);
        self.write_mdia(&mut content, duration);
        write_box(buf, b"trak", &content);
    }

    fn write_tkhd(&self, buf: &mut BytesMut, duration: u32) {
        let mut content = BytesMut::new();
        put_full_box_header(&mut content, 0, 3); // track enabled + in movie
        content.put_u32(0); // creation time
        content.put_u32(0); // modification time
        content.put_u32(1); // track ID
        content.put_u32(0); // reserved
        content.put_u32(duration);
        content.put_u64(0); // reserved
        content.put_u16(0); // layer
        content.put_u16(0); // alternate group
        content.put_u16(0); // volume
        content.put_u16(0); // reserved
        put_identity_matrix(&mut content);
        content.put_u32(self.width << 16); // 16.16 fixed point
        content.put_u32(self.height << 16);
        write_box(buf, b"tkhd", &content);
    }

    fn write_mdia(&self, buf: &mut BytesMut, duration: u32) {
        let mut content = BytesMut::new();

        let mut mdhd = BytesMut::new();
        put_full_box_header(&mut mdhd, 0, 0);
        mdhd.put_u32(0); // creation time
        mdhd.put_u32(0); // modification time
        mdhd.put_u32(self.timescale);
        mdhd.put_u32(duration);
        mdhd.put_u16(0x55C4); // language (und)
        mdhd.put_u16(0);
        write_box(&mut content, b"mdhd", &mdhd);

        let mut hdlr = BytesMut::new();
        put_full_box_header(&mut hdlr, 0, 0);
        hdlr.put_u32(0); // pre-defined
        hdlr.put_slice(b"vide");
        hdlr.put_slice(&[0u8; 12]); // reserved
        hdlr.put_slice(b"VideoHandler\0");
        write_box(&mut content, b"hdlr", &hdlr);

        self.write_minf(&mut content);
        write_box(buf, b"mdia", &content);
    }

    fn write_minf(&self, buf: &mut BytesMut) {
        let mut content = BytesMut::new();

        let mut vmhd = BytesMut::new();
        put_full_box_header(&mut vmhd, 0, 1);
        vmhd.put_u16(0); // graphics mode
        vmhd.put_slice(&[0u8; 6]); // opcolor
        write_box(&mut content, b"vmhd", &vmhd);

        let mut url = BytesMut::new();
        put_full_box_header(&mut url, 0, 1); // self-contained
        let mut dref = BytesMut::new();
        put_full_box_header(&mut dref, 0, 0);
        dref.put_u32(1);
        write_box(&mut dref, b"url ", &url);
        let mut dinf = BytesMut::new();
        write_box(&mut dinf, b"dref", &dref);
        write_box(&mut content, b"dinf", &dinf);

        self.write_stbl(&mut content);
        write_box(buf, b"minf", &content);
    }

    fn write_stbl(&self, buf: &mut BytesMut) {
        let mut content = BytesMut::new();
        self.write_stsd(&mut content);

        let mut stts = BytesMut::new();
        put_full_box_header(&mut stts, 0, 0);
        stts.put_u32(1);
        stts.put_u32(self.sample_count());
        stts.put_u32(SAMPLE_DELTA);
        write_box(&mut content, b"stts", &stts);

        let mut stss = BytesMut::new();
        put_full_box_header(&mut stss, 0, 0);
        stss.put_u32(self.sync_samples.len() as u32);
        for sample in &self.sync_samples {
            stss.put_u32(*sample);
        }
        write_box(&mut content, b"stss", &stss);

        let mut stsc = BytesMut::new();
        put_full_box_header(&mut stsc, 0, 0);
        stsc.put_u32(1);
        stsc.put_u32(1); // first chunk
        stsc.put_u32(1); // samples per chunk
        stsc.put_u32(1); // sample description index
        write_box(&mut content, b"stsc", &stsc);

        let mut stsz = BytesMut::new();
        put_full_box_header(&mut stsz, 0, 0);
        stsz.put_u32(0); // sizes vary
        stsz.put_u32(self.sample_count());
        for size in &self.sample_sizes {
            stsz.put_u32(*size);
        }
        write_box(&mut content, b"stsz", &stsz);

        let mut co64 = BytesMut::new();
        put_full_box_header(&mut co64, 0, 0);
        co64.put_u32(self.chunk_offsets.len() as u32);
        for offset in &self.chunk_offsets {
            co64.put_u64(*offset);
        }
        write_box(&mut content, b"co64", &co64);

        write_box(buf, b"stbl", &content);
    }

    fn write_stsd(&self, buf: &mut BytesMut) {
        let mut content = BytesMut::new();
        put_full_box_header(&mut content, 0, 0);
        content.put_u32(1); // entry count

        let mut avc1 = BytesMut::new();
        avc1.put_slice(&[0; 6]); // reserved
        avc1.put_u16(1); // data reference index
        avc1.put_u16(0); // pre-defined
        avc1.put_u16(0); // reserved
        avc1.put_slice(&[0; 12]); // pre-defined
        avc1.put_u16(self.width as u16);
        avc1.put_u16(self.height as u16);
        avc1.put_u32(0x00480000); // 72 dpi
        avc1.put_u32(0x00480000);
        avc1.put_u32(0); // reserved
        avc1.put_u16(1); // frame count
        avc1.put_slice(&[0; 32]); // compressor name
        avc1.put_u16(0x0018); // depth
        avc1.put_i16(-1);
        write_box(&mut avc1, b"avcC", &self.avcc_record());

        write_box(&mut content, b"avc1", &avc1);
        write_box(buf, b"stsd", &content);
    }

    /// AVCDecoderConfigurationRecord built from the captured parameter sets
    fn avcc_record(&self) -> BytesMut {
        let mut record = BytesMut::new();
        record.put_u8(1); // version
        record.put_u8(self.sps.get(1).copied().unwrap_or(0x42)); // profile
        record.put_u8(self.sps.get(2).copied().unwrap_or(0x00)); // compatibility
        record.put_u8(self.sps.get(3).copied().unwrap_or(0x1F)); // level
        record.put_u8(0xFF); // 4-byte NAL lengths
        record.put_u8(0xE1); // one SPS
        record.put_u16(self.sps.len() as u16);
        record.put_slice(&self.sps);
        record.put_u8(1); // one PPS
        record.put_u16(self.pps.len() as u16);
        record.put_slice(&self.pps);
        record
    }
}

fn write_box(buf: &mut BytesMut, box_type: &[u8; 4], content: &[u8]) {
    buf.put_u32(8 + content.len() as u32);
    buf.put_slice(box_type);
    buf.put_slice(content);
}

fn put_full_box_header(buf: &mut BytesMut, version: u8, flags: u32) {
    buf.put_u8(version);
    buf.put_slice(&flags.to_be_bytes()[1..]);
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

fn write_ftyp(buf: &mut BytesMut) {
    let mut content = BytesMut::new();
    content.put_slice(b"isom"); // major brand
    content.put_u32(0x200); // minor version
    content.put_slice(b"isomiso2avc1mp41"); // compatible brands
    write_box(buf, b"ftyp", &content);
}
