//! Participant Registry.
//!
//! Live map from remote participant identity to that participant's track
//! publications. Pure data: no device, network, or render access. Owned and
//! mutated only by the Room Session.
//!
//! # Invariants
//!
//! - A publication carries a handle if and only if it is subscribed.
//! - The local participant is never registered.

use common::types::{TrackHandle, TrackKind};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Registry rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Refusing to register the local participant: {0}")]
    LocalParticipant(String),
}

/// A remote participant's advertisement of one media track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPublication {
    sid: String,
    kind: TrackKind,
    handle: Option<TrackHandle>,
}

impl TrackPublication {
    /// Advertised, not yet delivered.
    #[must_use]
    pub fn unsubscribed(sid: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            sid: sid.into(),
            kind,
            handle: None,
        }
    }

    /// Delivered; the kind follows the handle.
    #[must_use]
    pub fn subscribed(sid: impl Into<String>, handle: TrackHandle) -> Self {
        Self {
            sid: sid.into(),
            kind: handle.kind(),
            handle: Some(handle),
        }
    }

    /// Publication id assigned by the provider.
    #[must_use]
    pub fn sid(&self) -> &str {
        &self.sid
    }

    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    #[must_use]
    pub fn handle(&self) -> Option<&TrackHandle> {
        self.handle.as_ref()
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.handle.is_some()
    }

    /// Drop the handle, returning it.
    pub fn unsubscribe(&mut self) -> Option<TrackHandle> {
        self.handle.take()
    }
}

/// A remote participant and their publications, keyed by sid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    identity: String,
    publications: HashMap<String, TrackPublication>,
}

impl Participant {
    fn new(identity: String) -> Self {
        Self {
            identity,
            publications: HashMap::new(),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn publication(&self, sid: &str) -> Option<&TrackPublication> {
        self.publications.get(sid)
    }

    pub fn publications(&self) -> impl Iterator<Item = &TrackPublication> {
        self.publications.values()
    }

    /// Consume the participant, yielding its publications.
    #[must_use]
    pub fn into_publications(self) -> Vec<TrackPublication> {
        self.publications.into_values().collect()
    }

    fn summary(&self) -> ParticipantSummary {
        let mut subscribed: Vec<TrackKind> = self
            .publications
            .values()
            .filter(|p| p.is_subscribed())
            .map(TrackPublication::kind)
            .collect();
        subscribed.sort_by_key(|kind| kind.as_str());

        ParticipantSummary {
            identity: self.identity.clone(),
            published: self.publications.len(),
            subscribed,
        }
    }
}

/// Read-only view of one participant for the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSummary {
    pub identity: String,
    /// Publications advertised, subscribed or not.
    pub published: usize,
    /// Kinds of the subscribed publications, sorted.
    pub subscribed: Vec<TrackKind>,
}

/// Participant Registry.
#[derive(Debug)]
pub struct ParticipantRegistry {
    local_identity: String,
    participants: HashMap<String, Participant>,
}

impl ParticipantRegistry {
    #[must_use]
    pub fn new(local_identity: impl Into<String>) -> Self {
        Self {
            local_identity: local_identity.into(),
            participants: HashMap::new(),
        }
    }

    #[must_use]
    pub fn local_identity(&self) -> &str {
        &self.local_identity
    }

    /// Register `identity` if absent. Returns `true` if it was newly added.
    ///
    /// # Errors
    ///
    /// `LocalParticipant` if `identity` is the local user.
    pub fn upsert_participant(&mut self, identity: &str) -> Result<bool, RegistryError> {
        if identity == self.local_identity {
            return Err(RegistryError::LocalParticipant(identity.to_string()));
        }
        if self.participants.contains_key(identity) {
            return Ok(false);
        }
        self.participants
            .insert(identity.to_string(), Participant::new(identity.to_string()));
        Ok(true)
    }

    /// Remove `identity`, returning it with its prior publications.
    pub fn remove_participant(&mut self, identity: &str) -> Option<Participant> {
        self.participants.remove(identity)
    }

    /// Insert or replace a publication. Returns the replaced one, if any.
    ///
    /// # Errors
    ///
    /// `UnknownParticipant` if `identity` is not registered.
    pub fn upsert_publication(
        &mut self,
        identity: &str,
        publication: TrackPublication,
    ) -> Result<Option<TrackPublication>, RegistryError> {
        let participant = self
            .participants
            .get_mut(identity)
            .ok_or_else(|| RegistryError::UnknownParticipant(identity.to_string()))?;
        Ok(participant
            .publications
            .insert(publication.sid.clone(), publication))
    }

    /// Remove a publication. Returns it if it existed.
    ///
    /// # Errors
    ///
    /// `UnknownParticipant` if `identity` is not registered.
    pub fn remove_publication(
        &mut self,
        identity: &str,
        sid: &str,
    ) -> Result<Option<TrackPublication>, RegistryError> {
        let participant = self
            .participants
            .get_mut(identity)
            .ok_or_else(|| RegistryError::UnknownParticipant(identity.to_string()))?;
        Ok(participant.publications.remove(sid))
    }

    #[must_use]
    pub fn participant(&self, identity: &str) -> Option<&Participant> {
        self.participants.get(identity)
    }

    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.participants.contains_key(identity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Every subscribed handle with its owner's identity.
    #[must_use]
    pub fn subscribed_handles(&self) -> Vec<(String, TrackHandle)> {
        self.participants
            .values()
            .flat_map(|p| {
                p.publications
                    .values()
                    .filter_map(move |publication| {
                        publication
                            .handle()
                            .map(|h| (p.identity.clone(), h.clone()))
                    })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }

    /// Roster view, sorted by identity.
    #[must_use]
    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        let mut summaries: Vec<ParticipantSummary> =
            self.participants.values().map(Participant::summary).collect();
        summaries.sort_by(|a, b| a.identity.cmp(&b.identity));
        summaries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn registry() -> ParticipantRegistry {
        ParticipantRegistry::new("patient-7")
    }

    #[test]
    fn test_publication_handle_iff_subscribed() {
        let mut publication =
            TrackPublication::subscribed("TR_v1", TrackHandle::new("v1", TrackKind::Video));
        assert!(publication.is_subscribed());
        assert_eq!(publication.kind(), TrackKind::Video);

        let handle = publication.unsubscribe();
        assert!(handle.is_some());
        assert!(!publication.is_subscribed());
        assert!(publication.handle().is_none());

        let advertised = TrackPublication::unsubscribed("TR_a1", TrackKind::Audio);
        assert!(!advertised.is_subscribed());
    }

    #[test]
    fn test_upsert_participant_is_idempotent() {
        let mut registry = registry();
        assert!(registry.upsert_participant("doctor-1").unwrap());
        assert!(!registry.upsert_participant("doctor-1").unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_local_participant_is_rejected() {
        let mut registry = registry();
        assert_eq!(
            registry.upsert_participant("patient-7"),
            Err(RegistryError::LocalParticipant("patient-7".to_string()))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_publication_for_unknown_participant_is_rejected() {
        let mut registry = registry();
        let result = registry.upsert_publication(
            "ghost",
            TrackPublication::unsubscribed("TR_a1", TrackKind::Audio),
        );
        assert_eq!(
            result,
            Err(RegistryError::UnknownParticipant("ghost".to_string()))
        );
        assert!(registry.remove_publication("ghost", "TR_a1").is_err());
    }

    #[test]
    fn test_upsert_publication_last_observation_wins() {
        let mut registry = registry();
        registry.upsert_participant("doctor-1").unwrap();

        let first = registry
            .upsert_publication(
                "doctor-1",
                TrackPublication::unsubscribed("TR_v1", TrackKind::Video),
            )
            .unwrap();
        assert!(first.is_none());

        let handle = TrackHandle::new("v1", TrackKind::Video);
        let replaced = registry
            .upsert_publication(
                "doctor-1",
                TrackPublication::subscribed("TR_v1", handle.clone()),
            )
            .unwrap();
        assert_eq!(
            replaced,
            Some(TrackPublication::unsubscribed("TR_v1", TrackKind::Video))
        );

        let participant = registry.participant("doctor-1").unwrap();
        assert_eq!(participant.publications().count(), 1);
        assert_eq!(
            participant.publication("TR_v1").unwrap().handle(),
            Some(&handle)
        );
    }

    #[test]
    fn test_remove_participant_returns_publications() {
        let mut registry = registry();
        registry.upsert_participant("doctor-1").unwrap();
        registry
            .upsert_publication(
                "doctor-1",
                TrackPublication::subscribed("TR_a1", TrackHandle::new("a1", TrackKind::Audio)),
            )
            .unwrap();
        registry
            .upsert_publication(
                "doctor-1",
                TrackPublication::subscribed("TR_v1", TrackHandle::new("v1", TrackKind::Video)),
            )
            .unwrap();

        let removed = registry.remove_participant("doctor-1").unwrap();
        let publications = removed.into_publications();
        assert_eq!(publications.len(), 2);
        assert!(publications.iter().all(TrackPublication::is_subscribed));
        assert!(!registry.contains("doctor-1"));
        assert!(registry.remove_participant("doctor-1").is_none());
    }

    #[test]
    fn test_subscribed_handles_and_summaries() {
        let mut registry = registry();
        registry.upsert_participant("doctor-1").unwrap();
        registry.upsert_participant("nurse-2").unwrap();
        registry
            .upsert_publication(
                "doctor-1",
                TrackPublication::subscribed("TR_v1", TrackHandle::new("v1", TrackKind::Video)),
            )
            .unwrap();
        registry
            .upsert_publication(
                "doctor-1",
                TrackPublication::unsubscribed("TR_a1", TrackKind::Audio),
            )
            .unwrap();

        let handles = registry.subscribed_handles();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles.first().map(|(id, _)| id.as_str()), Some("doctor-1"));

        let summaries = registry.summaries();
        assert_eq!(
            summaries,
            vec![
                ParticipantSummary {
                    identity: "doctor-1".to_string(),
                    published: 2,
                    subscribed: vec![TrackKind::Video],
                },
                ParticipantSummary {
                    identity: "nurse-2".to_string(),
                    published: 0,
                    subscribed: vec![],
                },
            ]
        );

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.summaries().is_empty());
    }
}
