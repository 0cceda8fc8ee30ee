//! OpenJPEG-backed JPEG2000 decoding.
//!
//! The engine pulls bytes through three callbacks bound to a boxed
//! [`ByteStream`]; ownership of that box moves to the engine's stream object,
//! which frees it through [`free_stream`] when destroyed.

use std::ffi::{c_char, c_void, CStr};
use std::ptr;

use openjpeg_sys as opj;
use tracing::{debug, error, info, warn};

use super::backend::{DecodeSession, ImageHeader, Jpeg2000Backend};
use super::pixels::ComponentPlane;
use super::stream::ByteStream;
use crate::error::{DecodeError, DecodeResult};

const OPJ_TRUE: opj::OPJ_BOOL = 1;
const OPJ_FALSE: opj::OPJ_BOOL = 0;

/// Raw J2K codestream decoding through the bundled OpenJPEG library.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenJpegBackend;

impl OpenJpegBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Jpeg2000Backend for OpenJpegBackend {
    fn open(&self, stream: ByteStream) -> DecodeResult<Box<dyn DecodeSession>> {
        Ok(Box::new(OpenJpegSession::new(stream)?))
    }
}

/// Engine handles for one decode.
///
/// Destroyed in reverse order of creation: image, codec, then the stream
/// (which releases the boxed [`ByteStream`]).
pub struct OpenJpegSession {
    stream: *mut opj::opj_stream_t,
    codec: *mut opj::opj_codec_t,
    image: *mut opj::opj_image_t,
}

impl OpenJpegSession {
    fn new(source: ByteStream) -> DecodeResult<Self> {
        let length = source.len() as u64;

        let mut session = Self {
            stream: ptr::null_mut(),
            codec: ptr::null_mut(),
            image: ptr::null_mut(),
        };

        unsafe {
            session.stream = opj::opj_stream_default_create(OPJ_TRUE);
            if session.stream.is_null() {
                return Err(DecodeError::Setup("cannot create engine stream".to_string()));
            }
            let user_data = Box::into_raw(Box::new(source)) as *mut c_void;
            opj::opj_stream_set_user_data(session.stream, user_data, Some(free_stream));
            opj::opj_stream_set_user_data_length(session.stream, length);
            opj::opj_stream_set_read_function(session.stream, Some(read_stream));
            opj::opj_stream_set_skip_function(session.stream, Some(skip_stream));
            opj::opj_stream_set_seek_function(session.stream, Some(seek_stream));

            session.codec = opj::opj_create_decompress(opj::CODEC_FORMAT::OPJ_CODEC_J2K);
            if session.codec.is_null() {
                return Err(DecodeError::Setup("cannot create J2K codec".to_string()));
            }
            opj::opj_set_info_handler(session.codec, Some(log_info), ptr::null_mut());
            opj::opj_set_warning_handler(session.codec, Some(log_warning), ptr::null_mut());
            opj::opj_set_error_handler(session.codec, Some(log_error), ptr::null_mut());

            let mut parameters: opj::opj_dparameters_t = std::mem::zeroed();
            opj::opj_set_default_decoder_parameters(&mut parameters);
            if opj::opj_setup_decoder(session.codec, &mut parameters) == OPJ_FALSE {
                return Err(DecodeError::Setup("decoder parameters rejected".to_string()));
            }
        }

        Ok(session)
    }

    fn header_image(&self) -> DecodeResult<&opj::opj_image_t> {
        unsafe { self.image.as_ref() }
            .ok_or_else(|| DecodeError::Decode("header has not been read".to_string()))
    }
}

impl DecodeSession for OpenJpegSession {
    fn read_header(&mut self) -> DecodeResult<ImageHeader> {
        if self.image.is_null() {
            let ok = unsafe { opj::opj_read_header(self.stream, self.codec, &mut self.image) };
            if ok == OPJ_FALSE || self.image.is_null() {
                return Err(DecodeError::Header("engine rejected codestream header".to_string()));
            }
        }

        let image = self.header_image()?;
        let header = ImageHeader {
            width: image.x1.saturating_sub(image.x0),
            height: image.y1.saturating_sub(image.y0),
            components: image.numcomps,
        };
        debug!(
            width = header.width,
            height = header.height,
            components = header.components,
            "Read JPEG2000 header"
        );
        Ok(header)
    }

    fn set_resolution_reduction(&mut self, factor: u32) -> DecodeResult<()> {
        let ok = unsafe { opj::opj_set_decoded_resolution_factor(self.codec, factor) };
        if ok == OPJ_FALSE {
            return Err(DecodeError::Setup(format!(
                "resolution reduction {} not available",
                factor
            )));
        }
        Ok(())
    }

    fn decode(&mut self) -> DecodeResult<Vec<ComponentPlane>> {
        self.header_image()?;

        unsafe {
            if opj::opj_decode(self.codec, self.stream, self.image) == OPJ_FALSE {
                return Err(DecodeError::Decode("engine failed to decode codestream".to_string()));
            }
            if opj::opj_end_decompress(self.codec, self.stream) == OPJ_FALSE {
                return Err(DecodeError::Decode("engine failed to finish decoding".to_string()));
            }
        }

        let image = self.header_image()?;
        if image.comps.is_null() {
            return Err(DecodeError::Decode("decoded image has no components".to_string()));
        }
        let comps = unsafe { std::slice::from_raw_parts(image.comps, image.numcomps as usize) };

        comps
            .iter()
            .enumerate()
            .map(|(index, comp)| copy_plane(index, comp))
            .collect()
    }
}

impl Drop for OpenJpegSession {
    fn drop(&mut self) {
        unsafe {
            if !self.image.is_null() {
                opj::opj_image_destroy(self.image);
            }
            if !self.codec.is_null() {
                opj::opj_destroy_codec(self.codec);
            }
            if !self.stream.is_null() {
                opj::opj_stream_destroy(self.stream);
            }
        }
    }
}

fn copy_plane(index: usize, comp: &opj::opj_image_comp_t) -> DecodeResult<ComponentPlane> {
    let count = comp.w as usize * comp.h as usize;
    if comp.data.is_null() {
        return Err(DecodeError::PlaneSamples {
            component: index,
            expected: count,
            actual: 0,
        });
    }
    let samples = unsafe { std::slice::from_raw_parts(comp.data, count) }.to_vec();

    Ok(ComponentPlane {
        width: comp.w,
        height: comp.h,
        precision: comp.prec,
        signed: comp.sgnd != 0,
        dx: comp.dx,
        dy: comp.dy,
        samples,
    })
}

/// Recover the stream behind the engine's user-data pointer.
///
/// # Safety
/// `user_data` must be the pointer handed to `opj_stream_set_user_data`
/// and not yet freed.
unsafe fn stream_from<'a>(user_data: *mut c_void) -> &'a mut ByteStream {
    &mut *(user_data as *mut ByteStream)
}

unsafe extern "C" fn read_stream(
    buffer: *mut c_void,
    count: usize,
    user_data: *mut c_void,
) -> usize {
    let stream = stream_from(user_data);
    let dst = std::slice::from_raw_parts_mut(buffer as *mut u8, count);
    match stream.read(dst) {
        // The engine reads (size_t)-1 as end of stream.
        0 => usize::MAX,
        n => n,
    }
}

unsafe extern "C" fn skip_stream(delta: i64, user_data: *mut c_void) -> i64 {
    let stream = stream_from(user_data);
    let before = stream.position() as i64;
    let moved = stream.skip(delta) as i64 - before;
    if moved == 0 && delta != 0 {
        -1
    } else {
        moved
    }
}

unsafe extern "C" fn seek_stream(target: i64, user_data: *mut c_void) -> opj::OPJ_BOOL {
    if stream_from(user_data).seek(target) {
        OPJ_TRUE
    } else {
        OPJ_FALSE
    }
}

unsafe extern "C" fn free_stream(user_data: *mut c_void) {
    if !user_data.is_null() {
        drop(Box::from_raw(user_data as *mut ByteStream));
    }
}

unsafe fn engine_message(msg: *const c_char) -> String {
    if msg.is_null() {
        return String::new();
    }
    CStr::from_ptr(msg).to_string_lossy().trim_end().to_string()
}

unsafe extern "C" fn log_info(msg: *const c_char, _client_data: *mut c_void) {
    info!(target: "openjpeg", "{}", engine_message(msg));
}

unsafe extern "C" fn log_warning(msg: *const c_char, _client_data: *mut c_void) {
    warn!(target: "openjpeg", "{}", engine_message(msg));
}

unsafe extern "C" fn log_error(msg: *const c_char, _client_data: *mut c_void) {
    error!(target: "openjpeg", "{}", engine_message(msg));
}
