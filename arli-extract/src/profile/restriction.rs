use crate::extraction::{InputRestriction, RestrictionKind};
use crate::osm::{tag, MemberType, OsmRelation};
use std::collections::BTreeSet;

/// Reads a turn restriction relation.
///
/// `modes` are the transport modes whose `restriction:<mode>` keys apply,
/// `exceptions` the `except=*` values that exempt the profile. Relations that
/// are not simple node restrictions yield `None`.
pub fn parse_restriction(
  relation: &OsmRelation,
  modes: &[String],
  exceptions: &BTreeSet<String>,
) -> Option<InputRestriction> {
  if tag(&relation.tags, "type") != Some("restriction") {
    return None;
  }

  let value = tag(&relation.tags, "restriction").or_else(|| {
    modes
      .iter()
      .find_map(|mode| tag(&relation.tags, &format!("restriction:{}", mode)))
  })?;
  let kind = if value.starts_with("only_") {
    RestrictionKind::Only
  } else if value.starts_with("no_") {
    RestrictionKind::No
  } else {
    return None;
  };

  if let Some(except) = tag(&relation.tags, "except") {
    if except.split(';').any(|e| exceptions.contains(e.trim())) {
      return None;
    }
  }

  let mut from_way = None;
  let mut via_node = None;
  let mut to_way = None;
  for member in &relation.members {
    let (slot, expected) = match member.role.as_str() {
      "from" => (&mut from_way, MemberType::Way),
      "via" => (&mut via_node, MemberType::Node),
      "to" => (&mut to_way, MemberType::Way),
      _ => continue,
    };
    // via ways and repeated roles are not supported
    if member.member_type != expected || slot.is_some() {
      return None;
    }
    *slot = Some(member.id);
  }

  Some(InputRestriction {
    from_way: from_way?,
    via_node: via_node?,
    to_way: to_way?,
    kind,
  })
}
