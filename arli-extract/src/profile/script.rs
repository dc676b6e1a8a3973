use super::restriction::parse_restriction;
use super::{ProfileError, ProfileEvaluator, Segment};
use crate::extraction::{AccessClass, ExtractionNode, ExtractionWay, InputRestriction, TravelDirection};
use crate::osm::{tag, OsmNode, OsmRelation, OsmWay, Tags};
use arli_raster::{FixedCoordinate, RasterRegistry, SourceId};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct SourceDeclaration {
  name: String,
  path: PathBuf,
  // xmin, xmax, ymin, ymax in degrees
  bounds: [f64; 4],
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct NodeRules {
  access_tags: Vec<String>,
  access_blacklist: BTreeSet<String>,
  barrier_whitelist: BTreeSet<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct WayRules {
  speeds: BTreeMap<String, BTreeMap<String, f64>>,
  access_tags: Vec<String>,
  access_blacklist: BTreeSet<String>,
  access_restricted: BTreeSet<String>,
  obey_oneway: bool,
  implied_oneway: BTreeSet<String>,
  maxspeed_factor: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct TurnRules {
  enabled: bool,
  modes: Vec<String>,
  exceptions: BTreeSet<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct SegmentRule {
  source: String,
  #[serde(default)]
  interpolate: bool,
  uphill_penalty: f64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct ProfileDocument {
  name: String,
  sources: Vec<SourceDeclaration>,
  node: NodeRules,
  way: WayRules,
  turn: TurnRules,
  segment: Option<SegmentRule>,
}

/// A parsed profile document, not yet bound to any raster data.
#[derive(Debug, Clone)]
pub struct ProfileScript {
  rules: Arc<ProfileDocument>,
  base_dir: PathBuf,
}

impl ProfileScript {
  pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ProfileError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let script = ProfileScript::parse(&text, base_dir)?;
    info!("Using profile '{}' from {}", script.name(), path.display());
    Ok(script)
  }

  /// Parses a profile whose raster paths are relative to `base_dir`.
  pub fn parse(text: &str, base_dir: PathBuf) -> Result<Self, ProfileError> {
    let rules: ProfileDocument = serde_json::from_str(text).map_err(|e| ProfileError::Script(e.to_string()))?;
    validate(&rules)?;
    Ok(ProfileScript {
      rules: Arc::new(rules),
      base_dir,
    })
  }

  pub fn name(&self) -> &str {
    &self.rules.name
  }

  /// Registers every declared raster source, returning their ids by name.
  pub fn load_sources(&self, registry: &mut RasterRegistry) -> Result<HashMap<String, SourceId>, ProfileError> {
    let mut ids = HashMap::new();
    for source in &self.rules.sources {
      let [xmin, xmax, ymin, ymax] = source.bounds;
      let id = registry.load(self.base_dir.join(&source.path), xmin, xmax, ymin, ymax)?;
      debug!("Raster source '{}' registered as {}", source.name, id);
      ids.insert(source.name.clone(), id);
    }
    Ok(ids)
  }

  /// Builds an evaluator reading rasters from `registry`.
  pub fn instantiate(
    &self,
    registry: Arc<RasterRegistry>,
    sources: &HashMap<String, SourceId>,
  ) -> Result<ScriptedProfile, ProfileError> {
    let segment_source = match &self.rules.segment {
      Some(rule) => Some(*sources.get(&rule.source).ok_or_else(|| {
        ProfileError::Script(format!("raster source '{}' was not loaded", rule.source))
      })?),
      None => None,
    };
    Ok(ScriptedProfile {
      rules: self.rules.clone(),
      registry,
      segment_source,
    })
  }
}

fn validate(rules: &ProfileDocument) -> Result<(), ProfileError> {
  for (key, values) in &rules.way.speeds {
    for (value, speed) in values {
      if !speed.is_finite() || *speed < 0.0 {
        return Err(ProfileError::Script(format!(
          "invalid speed {} for {}={}",
          speed, key, value
        )));
      }
    }
  }
  if let Some(factor) = rules.way.maxspeed_factor {
    if !factor.is_finite() || factor <= 0.0 {
      return Err(ProfileError::Script(format!("invalid maxspeed_factor {}", factor)));
    }
  }
  if let Some(segment) = &rules.segment {
    if !rules.sources.iter().any(|s| s.name == segment.source) {
      return Err(ProfileError::Script(format!(
        "segment rule refers to unknown raster source '{}'",
        segment.source
      )));
    }
    if !segment.uphill_penalty.is_finite() {
      return Err(ProfileError::Script("uphill_penalty must be finite".to_string()));
    }
  }
  Ok(())
}

/// Rule profile evaluator; cheap to clone, every clone shares the rules and
/// the raster registry.
#[derive(Clone)]
pub struct ScriptedProfile {
  rules: Arc<ProfileDocument>,
  registry: Arc<RasterRegistry>,
  segment_source: Option<SourceId>,
}

fn find_access<'a>(tags: &'a Tags, access_tags: &[String]) -> Option<&'a str> {
  access_tags.iter().find_map(|key| tag(tags, key))
}

fn parse_max_speed(val: &str) -> Option<f64> {
  lazy_static! {
    static ref MAX_SPEED_RE: Regex = Regex::new(r"^(?P<value>\d+)\s*(?P<unit>.*)$").unwrap();
  }
  let captures = MAX_SPEED_RE.captures(val.trim())?;
  let value = captures.name("value")?.as_str().parse::<f64>().ok()?;
  let value = match captures.name("unit").map(|m| m.as_str()) {
    Some("mph") => value * 1.6,
    Some("") | Some("km/h") | Some("kmh") | None => value,
    Some(_) => return None,
  };
  Some(value).filter(|v| *v > 0.0)
}

fn way_name(tags: &Tags) -> String {
  let name = tag(tags, "name").filter(|n| !n.is_empty());
  let reference = tag(tags, "ref").filter(|r| !r.is_empty());
  match (name, reference) {
    (Some(name), Some(reference)) => format!("{} ({})", name, reference),
    (Some(name), None) => name.to_string(),
    (None, Some(reference)) => reference.to_string(),
    (None, None) => String::new(),
  }
}

impl ScriptedProfile {
  fn travel_direction(&self, tags: &Tags) -> TravelDirection {
    let rules = &self.rules.way;
    if !rules.obey_oneway {
      return TravelDirection::Bidirectional;
    }
    let roundabout = tag(tags, "junction") == Some("roundabout");
    let implied = tag(tags, "highway").map_or(false, |h| rules.implied_oneway.contains(h));
    match tag(tags, "oneway") {
      Some("-1") => TravelDirection::Backward,
      Some("yes") | Some("1") | Some("true") => TravelDirection::Forward,
      _ if roundabout => TravelDirection::Forward,
      Some("no") => TravelDirection::Bidirectional,
      _ if implied => TravelDirection::Forward,
      _ => TravelDirection::Bidirectional,
    }
  }

  fn sample(&self, id: SourceId, interpolate: bool, coordinate: FixedCoordinate) -> Result<Option<i16>, ProfileError> {
    let value = if interpolate {
      self.registry.sample_bilinear(id, coordinate.lon, coordinate.lat)?
    } else {
      self.registry.sample_nearest(id, coordinate.lon, coordinate.lat)?
    };
    Ok(value)
  }
}

impl ProfileEvaluator for ScriptedProfile {
  fn evaluate_node(&mut self, node: &OsmNode, result: &mut ExtractionNode) -> Result<(), ProfileError> {
    let rules = &self.rules.node;
    if let Some(access) = find_access(&node.tags, &rules.access_tags) {
      result.barrier = rules.access_blacklist.contains(access);
      result.access = Some(access.to_string());
    } else if let Some(barrier) = tag(&node.tags, "barrier") {
      result.barrier = !rules.barrier_whitelist.contains(barrier);
    }
    result.traffic_signal = tag(&node.tags, "highway") == Some("traffic_signals");
    Ok(())
  }

  fn evaluate_way(&mut self, way: &OsmWay, result: &mut ExtractionWay) -> Result<(), ProfileError> {
    let rules = &self.rules.way;
    let speed = rules
      .speeds
      .iter()
      .find_map(|(key, values)| tag(&way.tags, key).and_then(|value| values.get(value)))
      .copied()
      .unwrap_or(0.0);
    if speed <= 0.0 {
      return Ok(());
    }

    let mut access = AccessClass::Public;
    if let Some(value) = find_access(&way.tags, &rules.access_tags) {
      if rules.access_blacklist.contains(value) {
        return Ok(());
      }
      if rules.access_restricted.contains(value) {
        access = AccessClass::Restricted;
      }
    }

    let mut forward_speed = speed;
    let mut backward_speed = speed;
    if let Some(factor) = rules.maxspeed_factor {
      if let Some(max) = tag(&way.tags, "maxspeed").and_then(parse_max_speed) {
        forward_speed = max * factor;
        backward_speed = max * factor;
      }
      if let Some(max) = tag(&way.tags, "maxspeed:forward").and_then(parse_max_speed) {
        forward_speed = max * factor;
      }
      if let Some(max) = tag(&way.tags, "maxspeed:backward").and_then(parse_max_speed) {
        backward_speed = max * factor;
      }
    }

    result.forward_speed = forward_speed;
    result.backward_speed = backward_speed;
    result.name = way_name(&way.tags);
    result.direction = self.travel_direction(&way.tags);
    result.roundabout = tag(&way.tags, "junction") == Some("roundabout");
    result.access = access;
    Ok(())
  }

  fn evaluate_turn(&mut self, relation: &OsmRelation) -> Result<Option<InputRestriction>, ProfileError> {
    let rules = &self.rules.turn;
    if !rules.enabled {
      return Ok(None);
    }
    Ok(parse_restriction(relation, &rules.modes, &rules.exceptions))
  }

  fn evaluate_segment(&mut self, segment: &mut Segment) -> Result<(), ProfileError> {
    let (rule, id) = match (&self.rules.segment, self.segment_source) {
      (Some(rule), Some(id)) => (rule, id),
      _ => return Ok(()),
    };
    if segment.distance <= 0.0 {
      return Ok(());
    }
    let source = self.sample(id, rule.interpolate, segment.source)?;
    let target = self.sample(id, rule.interpolate, segment.target)?;
    if let (Some(source), Some(target)) = (source, target) {
      let slope = (f64::from(target) - f64::from(source)) / segment.distance;
      segment.forward_weight *= 1.0 + rule.uphill_penalty * slope.max(0.0);
      segment.backward_weight *= 1.0 + rule.uphill_penalty * (-slope).max(0.0);
    }
    Ok(())
  }
}
