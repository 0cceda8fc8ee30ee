//! Test helpers: on-disk fixture caches and a scripted decoder backend.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use uuid::Uuid;

use crate::cache::{
    resolve_overflow_path, CacheEntryRecord, CacheHeader, DATA_FILE_NAME, NO_IMAGE_SENTINEL,
    PREFIX_SLOT_SIZE,
};
use crate::decode::{ByteStream, ComponentPlane, DecodeSession, ImageHeader, Jpeg2000Backend};
use crate::error::{DecodeError, DecodeResult};

/// One entry to write into a fixture cache.
///
/// `image_size` / `body_size` override the values derived from the bytes,
/// for writing deliberately inconsistent records.
#[derive(Debug, Clone)]
pub struct FixtureEntry {
    pub id: Uuid,
    pub prefix: Vec<u8>,
    pub body: Vec<u8>,
    pub image_size: Option<u32>,
    pub body_size: Option<u32>,
    pub time: i32,
}

impl FixtureEntry {
    pub fn inline(id: Uuid, prefix: Vec<u8>) -> Self {
        Self::with_body(id, prefix, Vec::new())
    }

    pub fn with_body(id: Uuid, prefix: Vec<u8>, body: Vec<u8>) -> Self {
        Self {
            id,
            prefix,
            body,
            image_size: None,
            body_size: None,
            time: 1_500_000_000,
        }
    }

    pub fn no_image(id: Uuid) -> Self {
        Self {
            image_size: Some(NO_IMAGE_SENTINEL),
            ..Self::inline(id, Vec::new())
        }
    }

    fn record(&self) -> CacheEntryRecord {
        CacheEntryRecord {
            id: self.id,
            image_size: self
                .image_size
                .unwrap_or((self.prefix.len() + self.body.len()) as u32),
            body_size: self.body_size.unwrap_or(self.body.len() as u32),
            time: self.time,
        }
    }
}

/// Builds a cache (index, data and overflow files) in a temporary directory.
#[derive(Debug, Default)]
pub struct CacheBuilder {
    encoder: Option<String>,
    entries: Vec<FixtureEntry>,
    declared_count: Option<u32>,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoder(mut self, name: &str) -> Self {
        self.encoder = Some(name.to_string());
        self
    }

    pub fn entry(mut self, entry: FixtureEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Header entry count to write instead of the real one.
    pub fn declared_count(mut self, count: u32) -> Self {
        self.declared_count = Some(count);
        self
    }

    pub fn build(self) -> CacheFixture {
        let dir = tempfile::tempdir().unwrap();
        let header = CacheHeader {
            version: 7.0,
            address: 0,
            encoder: self.encoder.unwrap_or_else(|| "OpenJPEG".to_string()),
            entry_count: self.declared_count.unwrap_or(self.entries.len() as u32),
        };

        let mut index = header.to_bytes().to_vec();
        let mut data = Vec::with_capacity(self.entries.len() * PREFIX_SLOT_SIZE);
        for entry in &self.entries {
            index.extend_from_slice(&entry.record().to_bytes());

            let mut slot = entry.prefix.clone();
            slot.resize(PREFIX_SLOT_SIZE, 0);
            data.extend_from_slice(&slot);

            if !entry.body.is_empty() {
                let path = resolve_overflow_path(dir.path(), &entry.id);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, &entry.body).unwrap();
            }
        }

        let fixture = CacheFixture { dir };
        fs::write(fixture.index_path(), index).unwrap();
        fs::write(fixture.data_path(), data).unwrap();
        fixture
    }
}

/// A fixture cache; the files are removed when this is dropped.
#[derive(Debug)]
pub struct CacheFixture {
    dir: TempDir,
}

impl CacheFixture {
    pub fn index_path(&self) -> PathBuf {
        self.dir.path().join("texture.entries")
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.path().join(DATA_FILE_NAME)
    }
}

#[derive(Debug, Default)]
struct MockCalls {
    last_input: Option<Vec<u8>>,
    reduction: Option<u32>,
}

/// Scripted [`Jpeg2000Backend`] that records what it was asked to do.
#[derive(Debug, Clone)]
pub struct MockBackend {
    header: ImageHeader,
    planes: Option<Vec<ComponentPlane>>,
    calls: Arc<Mutex<MockCalls>>,
}

impl MockBackend {
    /// Reports `width` x `height` in the header and decodes to `planes`.
    pub fn with_image(width: u32, height: u32, planes: Vec<ComponentPlane>) -> Self {
        Self {
            header: ImageHeader {
                width,
                height,
                components: planes.len() as u32,
            },
            planes: Some(planes),
            calls: Arc::default(),
        }
    }

    /// Parses a header, then fails the decode.
    pub fn failing() -> Self {
        Self {
            header: ImageHeader {
                width: 16,
                height: 16,
                components: 3,
            },
            planes: None,
            calls: Arc::default(),
        }
    }

    pub fn last_input(&self) -> Option<Vec<u8>> {
        self.calls.lock().unwrap().last_input.clone()
    }

    pub fn requested_reduction(&self) -> Option<u32> {
        self.calls.lock().unwrap().reduction
    }
}

impl Jpeg2000Backend for MockBackend {
    fn open(&self, stream: ByteStream) -> DecodeResult<Box<dyn DecodeSession>> {
        self.calls.lock().unwrap().last_input = Some(stream.into_inner());
        Ok(Box::new(MockSession {
            header: self.header,
            planes: self.planes.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct MockSession {
    header: ImageHeader,
    planes: Option<Vec<ComponentPlane>>,
    calls: Arc<Mutex<MockCalls>>,
}

impl DecodeSession for MockSession {
    fn read_header(&mut self) -> DecodeResult<ImageHeader> {
        Ok(self.header)
    }

    fn set_resolution_reduction(&mut self, factor: u32) -> DecodeResult<()> {
        self.calls.lock().unwrap().reduction = Some(factor);
        Ok(())
    }

    fn decode(&mut self) -> DecodeResult<Vec<ComponentPlane>> {
        self.planes
            .take()
            .ok_or_else(|| DecodeError::Decode("scripted failure".to_string()))
    }
}
