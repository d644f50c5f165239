//! Streaming Matroska container for uncompressed RGB frames.
//!
//! Only what ffmpeg's demuxer needs to read raw video with a timestamp per
//! frame: the EBML header, a segment of unknown size, one `V_UNCOMPRESSED`
//! track and a single-block cluster per frame. Nothing is seeked back to, so
//! the output can go straight into a pipe.

use std::io::{self, Write};

use gazereel_common::clock::Pts;

const EBML: u32 = 0x1A45_DFA3;
const EBML_VERSION: u32 = 0x4286;
const EBML_READ_VERSION: u32 = 0x42F7;
const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
const DOC_TYPE: u32 = 0x4282;
const DOC_TYPE_VERSION: u32 = 0x4287;
const DOC_TYPE_READ_VERSION: u32 = 0x4285;

const SEGMENT: u32 = 0x1853_8067;
const INFO: u32 = 0x1549_A966;
const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
const MUXING_APP: u32 = 0x4D80;
const WRITING_APP: u32 = 0x5741;

const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_NUMBER: u32 = 0xD7;
const TRACK_UID: u32 = 0x73C5;
const TRACK_TYPE: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const VIDEO: u32 = 0xE0;
const PIXEL_WIDTH: u32 = 0xB0;
const PIXEL_HEIGHT: u32 = 0xBA;
const COLOUR_SPACE: u32 = 0x2E_B524;

const CLUSTER: u32 = 0x1F43_B675;
const CLUSTER_TIMESTAMP: u32 = 0xE7;
const SIMPLE_BLOCK: u32 = 0xA3;

/// Element size meaning "until the end of the stream".
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Raw FourCC for packed 8-bit RGB.
const RGB24_FOURCC: [u8; 4] = [b'R', b'G', b'B', 24];

const TRACK_TYPE_VIDEO: u64 = 1;
const VIDEO_TRACK: u64 = 1;

/// SimpleBlock header after the size: track 1, relative timestamp 0, keyframe.
const BLOCK_HEADER: [u8; 4] = [0x81, 0x00, 0x00, 0x80];

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Writes one raw video track with per-frame timestamps.
#[derive(Debug, Clone)]
pub struct MatroskaWriter {
    width: u32,
    height: u32,
    timestamp_scale_ns: u64,
}

impl MatroskaWriter {
    /// Writer for `width`x`height` RGB frames with timestamps in
    /// `1/time_base` seconds. `time_base` must divide one second in
    /// nanoseconds.
    pub fn new(width: u32, height: u32, time_base: i64) -> Option<Self> {
        if time_base <= 0 || NANOS_PER_SEC % time_base != 0 {
            return None;
        }
        Some(Self {
            width,
            height,
            timestamp_scale_ns: (NANOS_PER_SEC / time_base) as u64,
        })
    }

    /// EBML header, segment start, segment info and track list.
    pub fn header(&self) -> Vec<u8> {
        let mut ebml = Vec::new();
        put_uint(&mut ebml, EBML_VERSION, 1);
        put_uint(&mut ebml, EBML_READ_VERSION, 1);
        put_uint(&mut ebml, EBML_MAX_ID_LENGTH, 4);
        put_uint(&mut ebml, EBML_MAX_SIZE_LENGTH, 8);
        put_bytes(&mut ebml, DOC_TYPE, b"matroska");
        put_uint(&mut ebml, DOC_TYPE_VERSION, 4);
        put_uint(&mut ebml, DOC_TYPE_READ_VERSION, 2);

        let mut info = Vec::new();
        put_uint(&mut info, TIMESTAMP_SCALE, self.timestamp_scale_ns);
        put_bytes(&mut info, MUXING_APP, b"gazereel");
        put_bytes(&mut info, WRITING_APP, b"gazereel");

        let mut video = Vec::new();
        put_uint(&mut video, PIXEL_WIDTH, u64::from(self.width));
        put_uint(&mut video, PIXEL_HEIGHT, u64::from(self.height));
        put_bytes(&mut video, COLOUR_SPACE, &RGB24_FOURCC);

        let mut track = Vec::new();
        put_uint(&mut track, TRACK_NUMBER, VIDEO_TRACK);
        put_uint(&mut track, TRACK_UID, VIDEO_TRACK);
        put_uint(&mut track, TRACK_TYPE, TRACK_TYPE_VIDEO);
        put_bytes(&mut track, CODEC_ID, b"V_UNCOMPRESSED");
        put_bytes(&mut track, VIDEO, &video);

        let mut tracks = Vec::new();
        put_bytes(&mut tracks, TRACK_ENTRY, &track);

        let mut out = Vec::new();
        put_bytes(&mut out, EBML, &ebml);
        put_id(&mut out, SEGMENT);
        out.extend_from_slice(&UNKNOWN_SIZE);
        put_bytes(&mut out, INFO, &info);
        put_bytes(&mut out, TRACKS, &tracks);
        out
    }

    /// Write `rgb` as one cluster starting at `pts`.
    pub fn write_frame<W: Write>(&self, out: &mut W, pts: Pts, rgb: &[u8]) -> io::Result<()> {
        let pts = u64::try_from(pts)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative timestamp"))?;

        let mut timestamp = Vec::new();
        put_uint(&mut timestamp, CLUSTER_TIMESTAMP, pts);

        let mut block = Vec::new();
        put_id(&mut block, SIMPLE_BLOCK);
        put_size(&mut block, (BLOCK_HEADER.len() + rgb.len()) as u64);
        block.extend_from_slice(&BLOCK_HEADER);

        let mut prefix = Vec::with_capacity(16 + timestamp.len() + block.len());
        put_id(&mut prefix, CLUSTER);
        put_size(
            &mut prefix,
            (timestamp.len() + block.len() + rgb.len()) as u64,
        );
        prefix.extend_from_slice(&timestamp);
        prefix.extend_from_slice(&block);

        out.write_all(&prefix)?;
        out.write_all(rgb)
    }
}

fn put_id(buf: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    buf.extend_from_slice(&bytes[skip..]);
}

/// Shortest EBML variable-length size; all-ones patterns are reserved.
fn put_size(buf: &mut Vec<u8>, size: u64) {
    let mut len = 1;
    while len < 8 && size >= (1u64 << (7 * len)) - 1 {
        len += 1;
    }
    let marked = size | (1u64 << (7 * len));
    buf.extend_from_slice(&marked.to_be_bytes()[8 - len..]);
}

fn put_uint(buf: &mut Vec<u8>, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    put_bytes(buf, id, &bytes[skip..]);
}

fn put_bytes(buf: &mut Vec<u8>, id: u32, data: &[u8]) {
    put_id(buf, id);
    put_size(buf, data.len() as u64);
    buf.extend_from_slice(data);
}
