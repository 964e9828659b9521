//! Audio endpoint references.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::PipeError;

/// Stable identity of a hardware audio endpoint.
///
/// Cheap to clone (`Arc<str>` internally). Two endpoints are the same device
/// exactly when their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(Arc<str>);

impl EndpointId {
    /// Creates an endpoint id from a string.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A hardware audio endpoint as handed out by a [`DeviceEnumerator`].
///
/// Carries a human-readable name for display and an [`EndpointId`] for
/// comparison. Equality and hashing only look at the id, so two references
/// to the same device compare equal even if their names were read at
/// different times.
///
/// [`DeviceEnumerator`]: crate::driver::DeviceEnumerator
///
/// # Example
///
/// ```
/// use stereo_split::AudioEndpoint;
///
/// let a = AudioEndpoint::new("dev-1", "Speakers");
/// let b = AudioEndpoint::new("dev-1", "Speakers (renamed)");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct AudioEndpoint {
    id: EndpointId,
    name: Arc<str>,
}

impl AudioEndpoint {
    /// Creates an endpoint reference from an id and a friendly name.
    pub fn new(id: impl Into<EndpointId>, name: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Creates an endpoint whose id is its name.
    pub fn named(name: &str) -> Self {
        Self::new(name, name)
    }

    /// Returns the stable identity of the endpoint.
    #[must_use]
    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    /// Returns the friendly name of the endpoint.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for AudioEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AudioEndpoint {}

impl Hash for AudioEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for AudioEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Resolves a user query to exactly one endpoint.
///
/// The query is either a 1-based index into `endpoints` or a
/// case-insensitive fragment of a friendly name. An exact name match wins
/// over fragment matches.
///
/// # Errors
///
/// Returns `DeviceNotFound` if nothing matches, and `AmbiguousDevice` if the
/// fragment matches more than one endpoint.
pub fn resolve_endpoint(endpoints: &[AudioEndpoint], query: &str) -> Result<AudioEndpoint, PipeError> {
    let query = query.trim();
    let not_found = || PipeError::DeviceNotFound {
        query: query.to_string(),
    };

    if query.is_empty() {
        return Err(not_found());
    }

    if let Ok(index) = query.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| endpoints.get(i))
            .cloned()
            .ok_or_else(not_found);
    }

    let needle = query.to_lowercase();
    if let Some(exact) = endpoints
        .iter()
        .find(|e| e.name().to_lowercase() == needle)
    {
        return Ok(exact.clone());
    }

    let matches: Vec<&AudioEndpoint> = endpoints
        .iter()
        .filter(|e| e.name().to_lowercase().contains(&needle))
        .collect();

    match matches.as_slice() {
        [] => Err(not_found()),
        [single] => Ok((*single).clone()),
        several => Err(PipeError::AmbiguousDevice {
            query: query.to_string(),
            matches: several.iter().map(|e| e.name().to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<AudioEndpoint> {
        vec![
            AudioEndpoint::new("1", "Speakers (Realtek Audio)"),
            AudioEndpoint::new("2", "USB Headset Left"),
            AudioEndpoint::new("3", "USB Headset"),
            AudioEndpoint::new("4", "HDMI Monitor"),
        ]
    }

    #[test]
    fn test_equality_by_id() {
        let a = AudioEndpoint::new("x", "One");
        let b = AudioEndpoint::new("x", "Two");
        let c = AudioEndpoint::new("y", "One");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_by_id() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(AudioEndpoint::new("x", "One"));
        set.insert(AudioEndpoint::new("x", "Other name"));
        set.insert(AudioEndpoint::new("y", "One"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display_uses_name() {
        let endpoint = AudioEndpoint::new("{0.0.0.00000000}", "Speakers");
        assert_eq!(endpoint.to_string(), "Speakers");
        assert_eq!(endpoint.id().as_str(), "{0.0.0.00000000}");
    }

    #[test]
    fn test_resolve_by_index() {
        let resolved = resolve_endpoint(&devices(), "4").unwrap();
        assert_eq!(resolved.name(), "HDMI Monitor");
    }

    #[test]
    fn test_resolve_index_out_of_range() {
        assert!(matches!(
            resolve_endpoint(&devices(), "0"),
            Err(PipeError::DeviceNotFound { .. })
        ));
        assert!(matches!(
            resolve_endpoint(&devices(), "5"),
            Err(PipeError::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_by_fragment_case_insensitive() {
        let resolved = resolve_endpoint(&devices(), "realtek").unwrap();
        assert_eq!(resolved.id().as_str(), "1");
    }

    #[test]
    fn test_resolve_exact_name_beats_fragment() {
        let resolved = resolve_endpoint(&devices(), "usb headset").unwrap();
        assert_eq!(resolved.id().as_str(), "3");
    }

    #[test]
    fn test_resolve_ambiguous() {
        let err = resolve_endpoint(&devices(), "usb").unwrap_err();
        match err {
            PipeError::AmbiguousDevice { matches, .. } => assert_eq!(matches.len(), 2),
            other => panic!("expected AmbiguousDevice, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_not_found() {
        assert!(matches!(
            resolve_endpoint(&devices(), "bluetooth"),
            Err(PipeError::DeviceNotFound { .. })
        ));
        assert!(matches!(
            resolve_endpoint(&devices(), "   "),
            Err(PipeError::DeviceNotFound { .. })
        ));
    }
}
