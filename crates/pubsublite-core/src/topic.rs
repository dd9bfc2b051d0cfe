//! Topic paths.
//!
//! A topic is identified by a fully-qualified path:
//!
//! ```text
//! projects/{project}/locations/{location}/topics/{name}
//! ```
//!
//! `{project}` is either a project id (`my-project`) or a project number
//! (`123456`), and `{location}` is either a region (`us-central1`) or a zone
//! (`us-central1-a`). Both are modelled as sum types so an invalid
//! combination can never be constructed.
//!
//! ## Example
//! ```ignore
//! let topic: TopicPath = "projects/123/locations/us-central1-a/topics/orders".parse()?;
//! assert_eq!(topic.project().number(), Some(123));
//! assert_eq!(topic.location().zone_id(), Some('a'));
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A project reference, by id or by number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectId {
    Id(String),
    Number(u64),
}

impl ProjectId {
    /// The project id, if this project is referenced by id.
    pub fn id(&self) -> Option<&str> {
        match self {
            ProjectId::Id(id) => Some(id),
            ProjectId::Number(_) => None,
        }
    }

    /// The project number, if this project is referenced by number.
    pub fn number(&self) -> Option<u64> {
        match self {
            ProjectId::Id(_) => None,
            ProjectId::Number(n) => Some(*n),
        }
    }
}

impl FromStr for ProjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidArgument("project must not be empty".to_string()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            let number = s
                .parse::<u64>()
                .map_err(|e| Error::InvalidArgument(format!("project number '{}': {}", s, e)))?;
            return Ok(ProjectId::Number(number));
        }
        Ok(ProjectId::Id(s.to_string()))
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectId::Id(id) => f.write_str(id),
            ProjectId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A cloud region (`us-central1`) or a zone within a region (`us-central1-a`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Region(String),
    Zone { region: String, zone_id: char },
}

impl Location {
    /// The region this location belongs to. Always present.
    pub fn region(&self) -> &str {
        match self {
            Location::Region(region) => region,
            Location::Zone { region, .. } => region,
        }
    }

    /// The zone letter, if this location is a zone.
    pub fn zone_id(&self) -> Option<char> {
        match self {
            Location::Region(_) => None,
            Location::Zone { zone_id, .. } => Some(*zone_id),
        }
    }

    pub fn is_zone(&self) -> bool {
        matches!(self, Location::Zone { .. })
    }
}

// Regions look like `{continent}-{area}{digit}`, e.g. `us-central1`,
// `europe-west4`. A zone appends `-{letter}`.
fn is_region(s: &str) -> bool {
    let mut parts = s.split('-');
    let (Some(continent), Some(area), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !continent.is_empty()
        && continent.bytes().all(|b| b.is_ascii_lowercase())
        && area.len() >= 2
        && area.bytes().last().is_some_and(|b| b.is_ascii_digit())
        && area.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if is_region(s) {
            return Ok(Location::Region(s.to_string()));
        }
        if let Some((region, zone)) = s.rsplit_once('-') {
            let mut chars = zone.chars();
            if let (Some(zone_id), None) = (chars.next(), chars.next()) {
                if zone_id.is_ascii_lowercase() && is_region(region) {
                    return Ok(Location::Zone {
                        region: region.to_string(),
                        zone_id,
                    });
                }
            }
        }
        Err(Error::InvalidLocation(s.to_string()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Region(region) => f.write_str(region),
            Location::Zone { region, zone_id } => write!(f, "{}-{}", region, zone_id),
        }
    }
}

/// Fully-qualified topic name. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPath {
    project: ProjectId,
    location: Location,
    name: String,
}

impl TopicPath {
    pub fn new(project: ProjectId, location: Location, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "topic name '{}' must be non-empty and contain no '/'",
                name
            )));
        }
        Ok(Self {
            project,
            location,
            name,
        })
    }

    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for TopicPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidTopicPath(s.to_string(), reason.to_string());

        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "locations", location, "topics", name] => {
                let project = project.parse().map_err(|_| invalid("bad project"))?;
                let location = location.parse().map_err(|_| invalid("bad location"))?;
                TopicPath::new(project, location, *name).map_err(|_| invalid("bad topic name"))
            }
            _ => Err(invalid(
                "expected projects/{project}/locations/{location}/topics/{name}",
            )),
        }
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/topics/{}",
            self.project, self.location, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic_with_project_number_and_zone() {
        let topic: TopicPath = "projects/123/locations/us-central1-a/topics/orders"
            .parse()
            .unwrap();
        assert_eq!(topic.project().number(), Some(123));
        assert_eq!(topic.project().id(), None);
        assert_eq!(topic.location().region(), "us-central1");
        assert_eq!(topic.location().zone_id(), Some('a'));
        assert_eq!(topic.name(), "orders");
    }

    #[test]
    fn test_parse_topic_with_project_id_and_region() {
        let topic: TopicPath = "projects/my-project/locations/europe-west4/topics/events"
            .parse()
            .unwrap();
        assert_eq!(topic.project().id(), Some("my-project"));
        assert!(!topic.location().is_zone());
        assert_eq!(topic.location().zone_id(), None);
    }

    #[test]
    fn test_topic_display_is_deterministic_join() {
        let topic = TopicPath::new(
            ProjectId::Id("p".to_string()),
            Location::Zone {
                region: "us-east1".to_string(),
                zone_id: 'b',
            },
            "t",
        )
        .unwrap();
        assert_eq!(topic.to_string(), "projects/p/locations/us-east1-b/topics/t");
        assert_eq!(topic.to_string().parse::<TopicPath>().unwrap(), topic);
    }

    #[test]
    fn test_parse_topic_rejects_malformed_paths() {
        assert!("projects/p/topics/t".parse::<TopicPath>().is_err());
        assert!("projects/p/locations/nowhere/topics/t"
            .parse::<TopicPath>()
            .is_err());
        assert!("projects//locations/us-central1/topics/t"
            .parse::<TopicPath>()
            .is_err());
        assert!("projects/p/locations/us-central1/topics/"
            .parse::<TopicPath>()
            .is_err());
    }

    #[test]
    fn test_location_rejects_multi_letter_zone() {
        assert!("us-central1-ab".parse::<Location>().is_err());
        assert!("us-central1-1".parse::<Location>().is_err());
        assert!("uscentral".parse::<Location>().is_err());
    }
}
