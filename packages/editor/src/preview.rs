//! Preview bookkeeping per (template, state).
//!
//! The ledger decides whether a render is needed and which in-flight render
//! is current. Requests are cheap to repeat: asking again for an already
//! rendered version is a no-op, and a newer version supersedes whatever is
//! still rendering. A request for a version older than the one rendering or
//! rendered is ignored. Completions from superseded generations are discarded.

use railspress_common::GraphState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque version token returned by the render service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderToken(pub String);

impl fmt::Display for RenderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Graph revision paired with the theme settings revision a view was
/// resolved against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewVersion {
    pub revision: u64,
    pub theme_revision: u64,
}

impl PreviewVersion {
    pub fn new(revision: u64, theme_revision: u64) -> Self {
        Self {
            revision,
            theme_revision,
        }
    }

    /// At least as new as `other` in both parts
    pub fn covers(&self, other: &PreviewVersion) -> bool {
        self.revision >= other.revision && self.theme_revision >= other.theme_revision
    }
}

impl fmt::Display for PreviewVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.revision, self.theme_revision)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPreview {
    pub version: PreviewVersion,
    pub token: RenderToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    generation: u64,
    version: PreviewVersion,
}

#[derive(Debug, Clone, Default)]
struct PreviewSlot {
    rendered: Option<RenderedPreview>,
    in_flight: Option<InFlight>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PreviewDecision {
    /// The last render already covers this version
    UpToDate { token: RenderToken },
    /// A render covering this version is already running
    AlreadyRendering { generation: u64 },
    /// Start a render under `generation`
    Start {
        generation: u64,
        superseded: Option<u64>,
    },
}

type SlotKey = (String, GraphState);

#[derive(Debug, Clone, Default)]
pub struct PreviewLedger {
    slots: BTreeMap<SlotKey, PreviewSlot>,
    next_generation: u64,
}

impl PreviewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, template_id: &str, state: GraphState, version: PreviewVersion) -> PreviewDecision {
        let slot = self.slots.entry((template_id.to_string(), state)).or_default();

        if let Some(in_flight) = slot.in_flight {
            if in_flight.version.covers(&version) {
                if in_flight.version != version {
                    tracing::debug!(
                        template_id = %template_id,
                        state = %state,
                        requested = %version,
                        rendering = %in_flight.version,
                        "Ignoring preview request older than the running render"
                    );
                }
                return PreviewDecision::AlreadyRendering {
                    generation: in_flight.generation,
                };
            }
        } else if let Some(rendered) = &slot.rendered {
            if rendered.version.covers(&version) {
                return PreviewDecision::UpToDate {
                    token: rendered.token.clone(),
                };
            }
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let superseded = slot.in_flight.replace(InFlight { generation, version }).map(|f| f.generation);
        if let Some(old) = superseded {
            tracing::debug!(
                template_id = %template_id,
                state = %state,
                superseded = old,
                generation,
                "Superseding in-flight preview"
            );
        }

        PreviewDecision::Start {
            generation,
            superseded,
        }
    }

    /// Record a finished render; false when `generation` is no longer current
    pub fn complete(&mut self, template_id: &str, state: GraphState, generation: u64, token: RenderToken) -> bool {
        let Some(slot) = self.slots.get_mut(&(template_id.to_string(), state)) else {
            return false;
        };
        match slot.in_flight {
            Some(in_flight) if in_flight.generation == generation => {
                slot.in_flight = None;
                slot.rendered = Some(RenderedPreview {
                    version: in_flight.version,
                    token,
                });
                true
            }
            _ => false,
        }
    }

    /// Clear a failed render so the next request retries it
    pub fn fail(&mut self, template_id: &str, state: GraphState, generation: u64) -> bool {
        let Some(slot) = self.slots.get_mut(&(template_id.to_string(), state)) else {
            return false;
        };
        if slot.in_flight.map(|f| f.generation) == Some(generation) {
            slot.in_flight = None;
            true
        } else {
            false
        }
    }

    pub fn latest(&self, template_id: &str, state: GraphState) -> Option<&RenderedPreview> {
        self.slots
            .get(&(template_id.to_string(), state))
            .and_then(|slot| slot.rendered.as_ref())
    }

    pub fn in_flight_generation(&self, template_id: &str, state: GraphState) -> Option<u64> {
        self.slots
            .get(&(template_id.to_string(), state))
            .and_then(|slot| slot.in_flight.map(|f| f.generation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> RenderToken {
        RenderToken(s.to_string())
    }

    fn v(revision: u64) -> PreviewVersion {
        PreviewVersion::new(revision, 0)
    }

    fn start_generation(decision: PreviewDecision) -> u64 {
        match decision {
            PreviewDecision::Start { generation, .. } => generation,
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn test_repeat_request_is_noop() {
        let mut ledger = PreviewLedger::new();
        let generation = start_generation(ledger.request("index", GraphState::Draft, v(3)));

        assert_eq!(
            ledger.request("index", GraphState::Draft, v(3)),
            PreviewDecision::AlreadyRendering { generation }
        );
        assert!(ledger.complete("index", GraphState::Draft, generation, token("t3")));
        assert_eq!(
            ledger.request("index", GraphState::Draft, v(3)),
            PreviewDecision::UpToDate { token: token("t3") }
        );
    }

    #[test]
    fn test_newer_revision_supersedes() {
        let mut ledger = PreviewLedger::new();
        let first = start_generation(ledger.request("index", GraphState::Draft, v(1)));

        let decision = ledger.request("index", GraphState::Draft, v(2));
        let PreviewDecision::Start { generation, superseded } = decision else {
            panic!("expected start");
        };
        assert_eq!(superseded, Some(first));

        assert!(!ledger.complete("index", GraphState::Draft, first, token("old")));
        assert!(ledger.latest("index", GraphState::Draft).is_none());
        assert!(ledger.complete("index", GraphState::Draft, generation, token("new")));
        assert_eq!(ledger.latest("index", GraphState::Draft).unwrap().version, v(2));
    }

    #[test]
    fn test_older_revision_does_not_supersede_newer() {
        let mut ledger = PreviewLedger::new();
        let newer = start_generation(ledger.request("index", GraphState::Draft, v(6)));

        assert_eq!(
            ledger.request("index", GraphState::Draft, v(5)),
            PreviewDecision::AlreadyRendering { generation: newer }
        );
        assert_eq!(ledger.in_flight_generation("index", GraphState::Draft), Some(newer));

        assert!(ledger.complete("index", GraphState::Draft, newer, token("t6")));
        assert_eq!(
            ledger.request("index", GraphState::Draft, v(5)),
            PreviewDecision::UpToDate { token: token("t6") }
        );
        assert_eq!(ledger.latest("index", GraphState::Draft).unwrap().version, v(6));
    }

    #[test]
    fn test_theme_revision_alone_triggers_render() {
        let mut ledger = PreviewLedger::new();
        let first = start_generation(ledger.request("index", GraphState::Draft, PreviewVersion::new(4, 1)));
        assert!(ledger.complete("index", GraphState::Draft, first, token("t4")));

        assert!(matches!(
            ledger.request("index", GraphState::Draft, PreviewVersion::new(4, 2)),
            PreviewDecision::Start { superseded: None, .. }
        ));
    }

    #[test]
    fn test_states_are_tracked_separately() {
        let mut ledger = PreviewLedger::new();
        let draft = start_generation(ledger.request("index", GraphState::Draft, v(1)));
        let live = start_generation(ledger.request("index", GraphState::Live, v(1)));

        assert_ne!(draft, live);
        assert_eq!(ledger.in_flight_generation("index", GraphState::Live), Some(live));
    }

    #[test]
    fn test_failed_render_can_be_retried() {
        let mut ledger = PreviewLedger::new();
        let generation = start_generation(ledger.request("index", GraphState::Draft, v(1)));

        assert!(ledger.fail("index", GraphState::Draft, generation));
        assert!(matches!(
            ledger.request("index", GraphState::Draft, v(1)),
            PreviewDecision::Start { superseded: None, .. }
        ));
    }
}
