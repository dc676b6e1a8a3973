//! OSM entity model and the readers that produce it buffer by buffer.

pub mod models;
pub mod pbf;
pub mod xml;

pub use models::*;
pub use pbf::PbfSource;
pub use xml::XmlSource;

use crate::error::{ExtractError, Result};
use std::collections::VecDeque;
use std::path::Path;

/// A decoder yielding the input as a sequence of entity buffers.
pub trait OsmSource {
  fn header(&self) -> &OsmHeader;

  /// Next buffer in file order, `None` at end of input.
  fn read(&mut self) -> Result<Option<OsmBuffer>>;
}

impl<S: OsmSource + ?Sized> OsmSource for Box<S> {
  fn header(&self) -> &OsmHeader {
    (**self).header()
  }

  fn read(&mut self) -> Result<Option<OsmBuffer>> {
    (**self).read()
  }
}

/// In-memory source, mostly for tests and embedding.
#[derive(Default)]
pub struct VecSource {
  header: OsmHeader,
  buffers: VecDeque<OsmBuffer>,
}

impl VecSource {
  pub fn new(header: OsmHeader, buffers: Vec<OsmBuffer>) -> Self {
    VecSource {
      header,
      buffers: buffers.into(),
    }
  }
}

impl OsmSource for VecSource {
  fn header(&self) -> &OsmHeader {
    &self.header
  }

  fn read(&mut self) -> Result<Option<OsmBuffer>> {
    Ok(self.buffers.pop_front())
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputFormat {
  Xml,
  Pbf,
}

impl InputFormat {
  pub fn from_path(path: &Path) -> Option<Self> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".pbf") {
      Some(InputFormat::Pbf)
    } else if name.ends_with(".osm") || name.ends_with(".xml") {
      Some(InputFormat::Xml)
    } else {
      None
    }
  }
}

/// Opens `path` with the reader matching its extension.
pub fn open_source(path: &Path, buffer_size: usize) -> Result<Box<dyn OsmSource>> {
  match InputFormat::from_path(path) {
    Some(InputFormat::Pbf) => Ok(Box::new(PbfSource::open(path)?)),
    Some(InputFormat::Xml) => Ok(Box::new(XmlSource::open(path)?.with_buffer_size(buffer_size))),
    None => Err(ExtractError::Config(format!(
      "unsupported input format: {}",
      path.display()
    ))),
  }
}
