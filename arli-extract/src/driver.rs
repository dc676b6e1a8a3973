//! Parallel evaluation of input buffers with an input-ordered merge.
//!
//! Every buffer is fanned out over a fixed rayon pool. A worker only touches
//! the evaluator at its own thread index, and results are staged with the
//! index of the entity they belong to. Once the buffer is done, the calling
//! thread replays the staged nodes, then ways, then restrictions to the
//! callbacks, each in index order, so the callbacks see the same sequence no
//! matter how many workers ran.

use crate::callbacks::ExtractorCallbacks;
use crate::error::{ExtractError, Result};
use crate::extraction::{ExtractionNode, ExtractionWay, InputRestriction};
use crate::osm::{OsmEntity, OsmSource};
use crate::profile::ProfileEvaluator;
use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Entities seen per kind.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementCounts {
  pub nodes: usize,
  pub ways: usize,
  pub relations: usize,
  pub others: usize,
}

#[derive(Default)]
struct Counters {
  nodes: AtomicUsize,
  ways: AtomicUsize,
  relations: AtomicUsize,
  others: AtomicUsize,
}

impl Counters {
  fn snapshot(&self) -> ElementCounts {
    ElementCounts {
      nodes: self.nodes.load(Ordering::Relaxed),
      ways: self.ways.load(Ordering::Relaxed),
      relations: self.relations.load(Ordering::Relaxed),
      others: self.others.load(Ordering::Relaxed),
    }
  }
}

#[derive(Default)]
struct StagedBuffer {
  nodes: Vec<(usize, ExtractionNode)>,
  ways: Vec<(usize, ExtractionWay)>,
  restrictions: Vec<(usize, Option<InputRestriction>)>,
}

impl StagedBuffer {
  fn append(mut self, mut other: StagedBuffer) -> Self {
    self.nodes.append(&mut other.nodes);
    self.ways.append(&mut other.ways);
    self.restrictions.append(&mut other.restrictions);
    self
  }
}

pub struct ParserDriver<E> {
  evaluators: Vec<Mutex<E>>,
  pool: ThreadPool,
}

impl<E: ProfileEvaluator> ParserDriver<E> {
  /// Creates a driver with one worker thread per evaluator.
  pub fn new(evaluators: Vec<E>) -> Result<Self> {
    if evaluators.is_empty() {
      return Err(ExtractError::Config("at least one profile evaluator is required".to_string()));
    }
    let pool = ThreadPoolBuilder::new()
      .num_threads(evaluators.len())
      .thread_name(|index| format!("arli-extract-{}", index))
      .build()
      .map_err(|e| ExtractError::Config(format!("cannot start worker threads: {}", e)))?;
    Ok(ParserDriver {
      evaluators: evaluators.into_iter().map(Mutex::new).collect(),
      pool,
    })
  }

  /// Reads `source` to the end, forwarding evaluated elements to `callbacks`.
  pub fn run<S, C>(&self, source: &mut S, callbacks: &mut C) -> Result<ElementCounts>
  where
    S: OsmSource + ?Sized,
    C: ExtractorCallbacks + ?Sized,
  {
    let timer = Instant::now();
    let counters = Counters::default();
    let mut buffers = 0usize;

    while let Some(buffer) = source.read()? {
      if buffer.is_empty() {
        continue;
      }
      let staged = self.evaluate_buffer(&buffer, &counters)?;
      merge(&buffer, staged, callbacks);
      buffers += 1;
      debug!("Buffer {} with {} entities merged", buffers, buffer.len());
    }

    let counts = counters.snapshot();
    info!(
      "Parsed {} nodes, {} ways, {} relations and {} other entities from {} buffers in {:.2} seconds",
      counts.nodes,
      counts.ways,
      counts.relations,
      counts.others,
      buffers,
      timer.elapsed().as_secs_f32()
    );
    Ok(counts)
  }

  fn evaluate_buffer(&self, buffer: &[OsmEntity], counters: &Counters) -> Result<StagedBuffer> {
    let evaluators = &self.evaluators;
    self.pool.install(|| {
      (0..buffer.len())
        .into_par_iter()
        .try_fold(StagedBuffer::default, |mut staged, index| -> Result<StagedBuffer> {
          let slot = rayon::current_thread_index().unwrap_or(0) % evaluators.len();
          let mut evaluator = evaluators[slot].lock().unwrap_or_else(PoisonError::into_inner);
          match &buffer[index] {
            OsmEntity::Node(node) => {
              counters.nodes.fetch_add(1, Ordering::Relaxed);
              let mut result = ExtractionNode::default();
              evaluator.evaluate_node(node, &mut result)?;
              staged.nodes.push((index, result));
            }
            OsmEntity::Way(way) => {
              counters.ways.fetch_add(1, Ordering::Relaxed);
              let mut result = ExtractionWay::default();
              evaluator.evaluate_way(way, &mut result)?;
              staged.ways.push((index, result));
            }
            OsmEntity::Relation(relation) => {
              counters.relations.fetch_add(1, Ordering::Relaxed);
              let restriction = evaluator.evaluate_turn(relation)?;
              staged.restrictions.push((index, restriction));
            }
            OsmEntity::Other(_) => {
              counters.others.fetch_add(1, Ordering::Relaxed);
            }
          }
          Ok(staged)
        })
        .try_reduce(StagedBuffer::default, |left, right| Ok(left.append(right)))
    })
  }

  /// Hands the evaluators back, e.g. for the segment pass after parsing.
  pub fn into_evaluators(self) -> Vec<E> {
    self
      .evaluators
      .into_iter()
      .map(|evaluator| evaluator.into_inner().unwrap_or_else(PoisonError::into_inner))
      .collect()
  }
}

fn merge<C: ExtractorCallbacks + ?Sized>(buffer: &[OsmEntity], mut staged: StagedBuffer, callbacks: &mut C) {
  staged.nodes.sort_by_key(|(index, _)| *index);
  staged.ways.sort_by_key(|(index, _)| *index);
  staged.restrictions.sort_by_key(|(index, _)| *index);

  for (index, result) in &staged.nodes {
    if let OsmEntity::Node(node) = &buffer[*index] {
      callbacks.process_node(node, result);
    }
  }
  for (index, result) in &staged.ways {
    if let OsmEntity::Way(way) = &buffer[*index] {
      callbacks.process_way(way, result);
    }
  }
  for (_, restriction) in staged.restrictions {
    callbacks.process_restriction(restriction);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::extraction::RestrictionKind;
  use crate::osm::*;
  use crate::profile::ProfileError;
  use arli_raster::FixedCoordinate;

  #[derive(Default)]
  struct TestProfile {
    evaluated: usize,
  }

  impl ProfileEvaluator for TestProfile {
    fn evaluate_node(&mut self, node: &OsmNode, result: &mut ExtractionNode) -> std::result::Result<(), ProfileError> {
      self.evaluated += 1;
      result.barrier = node.id % 2 == 0;
      Ok(())
    }

    fn evaluate_way(&mut self, way: &OsmWay, result: &mut ExtractionWay) -> std::result::Result<(), ProfileError> {
      self.evaluated += 1;
      if tag(&way.tags, "fail").is_some() {
        return Err(ProfileError::Script(format!("cannot evaluate way {}", way.id)));
      }
      result.name = format!("w{}", way.id);
      Ok(())
    }

    fn evaluate_turn(&mut self, relation: &OsmRelation) -> std::result::Result<Option<InputRestriction>, ProfileError> {
      self.evaluated += 1;
      Ok(Some(InputRestriction {
        from_way: relation.id,
        via_node: 0,
        to_way: 0,
        kind: RestrictionKind::No,
      }))
    }
  }

  #[derive(Default)]
  struct Recorder {
    events: Vec<String>,
  }

  impl ExtractorCallbacks for Recorder {
    fn process_node(&mut self, node: &OsmNode, extraction: &ExtractionNode) {
      self.events.push(format!("node {} {}", node.id, extraction.barrier));
    }

    fn process_way(&mut self, way: &OsmWay, extraction: &ExtractionWay) {
      self.events.push(format!("way {} {}", way.id, extraction.name));
    }

    fn process_restriction(&mut self, restriction: Option<InputRestriction>) {
      self.events.push(format!("restriction {:?}", restriction.map(|r| r.from_way)));
    }
  }

  fn node(id: i64) -> OsmEntity {
    OsmEntity::Node(OsmNode {
      id,
      coord: FixedCoordinate::new(0, 0),
      tags: Tags::new(),
    })
  }

  fn way(id: i64, fail: bool) -> OsmEntity {
    let mut tags = Tags::new();
    if fail {
      tags.insert("fail".to_string(), "yes".to_string());
    }
    OsmEntity::Way(OsmWay {
      id,
      nodes: vec![],
      tags,
    })
  }

  fn relation(id: i64) -> OsmEntity {
    OsmEntity::Relation(OsmRelation {
      id,
      members: vec![],
      tags: Tags::new(),
    })
  }

  fn buffers() -> Vec<OsmBuffer> {
    let first: OsmBuffer = (1..=200)
      .map(node)
      .chain((1000..1100).map(|id| way(id, false)))
      .chain(vec![relation(7), OsmEntity::Other("changeset".into()), relation(8)])
      .collect();
    let second = vec![way(2000, false), node(300)];
    vec![first, vec![], second]
  }

  fn run(threads: usize) -> (Vec<String>, ElementCounts) {
    let evaluators = (0..threads).map(|_| TestProfile::default()).collect();
    let driver = ParserDriver::new(evaluators).unwrap();
    let mut source = VecSource::new(OsmHeader::default(), buffers());
    let mut recorder = Recorder::default();
    let counts = driver.run(&mut source, &mut recorder).unwrap();
    (recorder.events, counts)
  }

  #[test]
  fn test_counts() {
    let (events, counts) = run(2);
    assert_eq!(
      counts,
      ElementCounts {
        nodes: 201,
        ways: 101,
        relations: 2,
        others: 1,
      }
    );
    assert_eq!(events.len(), 304);
  }

  #[test]
  fn test_merge_follows_input_order() {
    let (single, _) = run(1);
    let (parallel, _) = run(8);
    assert_eq!(single, parallel);

    assert_eq!(single[0], "node 1 false");
    assert_eq!(single[1], "node 2 true");
    assert_eq!(single[200], "way 1000 w1000");
    assert_eq!(single[300], "restriction Some(7)");
    assert_eq!(single[301], "restriction Some(8)");
    // second buffer: nodes are replayed before ways
    assert_eq!(single[302], "node 300 true");
    assert_eq!(single[303], "way 2000 w2000");
  }

  #[test]
  fn test_evaluator_error_aborts() {
    let driver = ParserDriver::new(vec![TestProfile::default(), TestProfile::default()]).unwrap();
    let buffers = vec![vec![node(1), way(13, true), node(2)], vec![node(3)]];
    let mut source = VecSource::new(OsmHeader::default(), buffers);
    let mut recorder = Recorder::default();
    let result = driver.run(&mut source, &mut recorder);
    match result {
      Err(ExtractError::Profile(ProfileError::Script(message))) => assert_eq!(message, "cannot evaluate way 13"),
      other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
    assert!(recorder.events.is_empty());
  }

  #[test]
  fn test_evaluators_are_returned() {
    let driver = ParserDriver::new(Vec::<TestProfile>::new());
    assert!(driver.is_err());

    let driver = ParserDriver::new(vec![TestProfile::default(), TestProfile::default()]).unwrap();
    let mut source = VecSource::new(OsmHeader::default(), buffers());
    driver.run(&mut source, &mut Recorder::default()).unwrap();
    let evaluated: usize = driver.into_evaluators().iter().map(|e| e.evaluated).sum();
    assert_eq!(evaluated, 304);
  }
}
