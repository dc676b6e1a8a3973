//! Streaming reader for OSM XML files.

use super::models::*;
use super::OsmSource;
use crate::error::{ExtractError, Result};
use arli_raster::FixedCoordinate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const DEFAULT_BUFFER_SIZE: usize = 8192;

pub struct XmlSource<R: BufRead> {
  reader: Reader<R>,
  header: OsmHeader,
  // First entity element, read ahead while scanning for header elements
  pending: Option<(BytesStart<'static>, bool)>,
  buffer_size: usize,
  finished: bool,
  buf: Vec<u8>,
}

impl XmlSource<BufReader<File>> {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    XmlSource::from_reader(BufReader::new(File::open(path)?))
  }
}

impl<R: BufRead> XmlSource<R> {
  pub fn from_reader(input: R) -> Result<Self> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut source = XmlSource {
      reader,
      header: OsmHeader::default(),
      pending: None,
      buffer_size: DEFAULT_BUFFER_SIZE,
      finished: false,
      buf: Vec::new(),
    };
    source.read_header()?;
    Ok(source)
  }

  /// Number of entities per buffer returned by `read`.
  pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
    self.buffer_size = buffer_size.max(1);
    self
  }

  fn next_event(&mut self) -> Result<Event<'static>> {
    self.buf.clear();
    let event = self
      .reader
      .read_event_into(&mut self.buf)
      .map_err(|e| ExtractError::Format(format!("XML error: {}", e)))?;
    Ok(event.into_owned())
  }

  /// Consumes everything up to the first entity element.
  fn read_header(&mut self) -> Result<()> {
    let mut has_root = false;
    loop {
      let (element, empty) = match self.next_event()? {
        Event::Start(e) => (e, false),
        Event::Empty(e) => (e, true),
        Event::Eof => break,
        Event::End(_) => {
          self.finished = true;
          break;
        }
        _ => continue,
      };

      let name = element.name().as_ref().to_vec();
      match name.as_slice() {
        b"osm" => {
          has_root = true;
          if let Some(generator) = attribute(&element, b"generator")? {
            self.header.set(OsmHeader::GENERATOR, generator);
          }
          if let Some(timestamp) = attribute(&element, b"timestamp")? {
            self.header.set(OsmHeader::REPLICATION_TIMESTAMP, timestamp);
          }
          if empty {
            self.finished = true;
            break;
          }
        }
        b"meta" => {
          // Overpass API marks the data state with <meta osm_base="..."/>
          if let Some(timestamp) = attribute(&element, b"osm_base")? {
            self.header.set(OsmHeader::REPLICATION_TIMESTAMP, timestamp);
          }
          self.read_children(b"meta", empty)?;
        }
        b"note" | b"bounds" => {
          self.read_children(&name, empty)?;
        }
        _ => {
          self.pending = Some((element, empty));
          break;
        }
      }
    }

    if !has_root {
      return Err(ExtractError::Format("missing <osm> root element".to_string()));
    }
    Ok(())
  }

  fn next_element(&mut self) -> Result<Option<(BytesStart<'static>, bool)>> {
    if let Some(pending) = self.pending.take() {
      return Ok(Some(pending));
    }
    if self.finished {
      return Ok(None);
    }
    loop {
      match self.next_event()? {
        Event::Start(e) => return Ok(Some((e, false))),
        Event::Empty(e) => return Ok(Some((e, true))),
        Event::End(_) | Event::Eof => {
          self.finished = true;
          return Ok(None);
        }
        _ => {}
      }
    }
  }

  /// Collects the direct children of an element, consuming its closing tag.
  fn read_children(&mut self, parent: &[u8], empty: bool) -> Result<Vec<BytesStart<'static>>> {
    let mut children = Vec::new();
    if empty {
      return Ok(children);
    }
    let mut depth = 0usize;
    loop {
      match self.next_event()? {
        Event::Start(e) => {
          if depth == 0 {
            children.push(e);
          }
          depth += 1;
        }
        Event::Empty(e) => {
          if depth == 0 {
            children.push(e);
          }
        }
        Event::End(e) => {
          if depth == 0 {
            if e.name().as_ref() != parent {
              return Err(ExtractError::Format(format!(
                "unexpected closing tag </{}>",
                String::from_utf8_lossy(e.name().as_ref())
              )));
            }
            return Ok(children);
          }
          depth -= 1;
        }
        Event::Eof => {
          return Err(ExtractError::Format(format!(
            "unexpected end of file inside <{}>",
            String::from_utf8_lossy(parent)
          )))
        }
        _ => {}
      }
    }
  }

  fn parse_entity(&mut self, element: BytesStart<'static>, empty: bool) -> Result<OsmEntity> {
    let name = element.name().as_ref().to_vec();
    let children = self.read_children(&name, empty)?;

    let entity = match name.as_slice() {
      b"node" => {
        let lon = required(&element, b"lon")?;
        let lat = required(&element, b"lat")?;
        OsmEntity::Node(OsmNode {
          id: required(&element, b"id")?,
          coord: FixedCoordinate::from_degrees(lon, lat),
          tags: collect_tags(&children)?,
        })
      }
      b"way" => {
        let mut nodes = Vec::new();
        for child in children.iter().filter(|c| c.name().as_ref() == b"nd") {
          nodes.push(required(child, b"ref")?);
        }
        OsmEntity::Way(OsmWay {
          id: required(&element, b"id")?,
          nodes,
          tags: collect_tags(&children)?,
        })
      }
      b"relation" => {
        let mut members = Vec::new();
        for child in children.iter().filter(|c| c.name().as_ref() == b"member") {
          let member_type = match attribute(child, b"type")?.as_deref() {
            Some("node") => MemberType::Node,
            Some("way") => MemberType::Way,
            Some("relation") => MemberType::Relation,
            other => {
              return Err(ExtractError::Format(format!("unknown relation member type {:?}", other)));
            }
          };
          members.push(RelationMember {
            member_type,
            id: required(child, b"ref")?,
            role: attribute(child, b"role")?.unwrap_or_default(),
          });
        }
        OsmEntity::Relation(OsmRelation {
          id: required(&element, b"id")?,
          members,
          tags: collect_tags(&children)?,
        })
      }
      other => OsmEntity::Other(String::from_utf8_lossy(other).into_owned()),
    };
    Ok(entity)
  }
}

impl<R: BufRead> OsmSource for XmlSource<R> {
  fn header(&self) -> &OsmHeader {
    &self.header
  }

  fn read(&mut self) -> Result<Option<OsmBuffer>> {
    let mut buffer = Vec::with_capacity(self.buffer_size.min(DEFAULT_BUFFER_SIZE));
    while buffer.len() < self.buffer_size {
      match self.next_element()? {
        Some((element, empty)) => buffer.push(self.parse_entity(element, empty)?),
        None => break,
      }
    }
    if buffer.is_empty() {
      return Ok(None);
    }
    Ok(Some(buffer))
  }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
  for attr in element.attributes().with_checks(false) {
    let attr = attr.map_err(|e| ExtractError::Format(e.to_string()))?;
    if attr.key.as_ref() == key {
      let value = attr
        .unescape_value()
        .map_err(|e| ExtractError::Format(e.to_string()))?;
      return Ok(Some(value.into_owned()));
    }
  }
  Ok(None)
}

fn required<T: std::str::FromStr>(element: &BytesStart<'_>, key: &[u8]) -> Result<T> {
  let describe = || {
    format!(
      "<{}> attribute `{}`",
      String::from_utf8_lossy(element.name().as_ref()),
      String::from_utf8_lossy(key)
    )
  };
  let value = attribute(element, key)?.ok_or_else(|| ExtractError::Format(format!("missing {}", describe())))?;
  value
    .trim()
    .parse()
    .map_err(|_| ExtractError::Format(format!("invalid {}: {:?}", describe(), value)))
}

fn collect_tags(children: &[BytesStart<'static>]) -> Result<Tags> {
  let mut tags = Tags::new();
  for child in children.iter().filter(|c| c.name().as_ref() == b"tag") {
    if let (Some(key), Some(value)) = (attribute(child, b"k")?, attribute(child, b"v")?) {
      tags.insert(key, value);
    }
  }
  Ok(tags)
}
