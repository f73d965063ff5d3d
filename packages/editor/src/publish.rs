//! Publish-time checks on a draft graph.
//!
//! Publishing is all-or-nothing, so the whole draft is walked first and every
//! problem collected; any issue rejects the publish with the full list.

use crate::ordering::{check_sequence, SequenceFault};
use railspress_common::{walk_section, Block, Composition, Section, Settings, Visitor};
use railspress_schema::{validate_value, Schema, SchemaRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueReason {
    EmptyDraft,
    UnknownSectionType,
    UnknownBlockType,
    BlockNotAllowed,
    TooManyBlocks,
    InvalidSetting,
    DuplicateId,
    PositionCorrupt,
}

/// One reason a draft cannot be published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishIssue {
    pub reason: IssueReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    pub message: String,
}

impl PublishIssue {
    fn section(reason: IssueReason, section_id: &str, message: impl Into<String>) -> Self {
        Self {
            reason,
            section_id: Some(section_id.to_string()),
            block_id: None,
            message: message.into(),
        }
    }

    fn block(reason: IssueReason, section_id: &str, block_id: &str, message: impl Into<String>) -> Self {
        Self {
            reason,
            section_id: Some(section_id.to_string()),
            block_id: Some(block_id.to_string()),
            message: message.into(),
        }
    }
}

/// Collect every issue that would make `draft` unpublishable
pub fn check_publishable(draft: &Composition, registry: &SchemaRegistry) -> Vec<PublishIssue> {
    if draft.is_empty() {
        return vec![PublishIssue {
            reason: IssueReason::EmptyDraft,
            section_id: None,
            block_id: None,
            message: "Draft has no sections".to_string(),
        }];
    }

    let mut checker = PublishChecker {
        registry,
        issues: Vec::new(),
        seen_ids: HashSet::new(),
        flagged: HashSet::new(),
    };
    checker.visit_composition(draft);
    checker.issues
}

struct PublishChecker<'a> {
    registry: &'a SchemaRegistry,
    issues: Vec<PublishIssue>,
    seen_ids: HashSet<String>,
    /// Ids already reported as duplicates within one list
    flagged: HashSet<String>,
}

impl PublishChecker<'_> {
    fn sequence(&mut self, faults: Vec<SequenceFault>, section_id: Option<&str>) {
        for fault in faults {
            let (reason, id, message) = match fault {
                SequenceFault::DuplicateId(id) => {
                    self.flagged.insert(id.clone());
                    (IssueReason::DuplicateId, id.clone(), format!("Identifier {} appears twice", id))
                }
                SequenceFault::PositionGap {
                    id,
                    position,
                    expected,
                } => (
                    IssueReason::PositionCorrupt,
                    id,
                    format!("Position {} where {} was expected", position, expected),
                ),
            };
            self.issues.push(match section_id {
                Some(section_id) => PublishIssue::block(reason, section_id, &id, message),
                None => PublishIssue::section(reason, &id, message),
            });
        }
    }

    fn settings(&mut self, schema: &Schema, stored: &Settings, section_id: &str, block_id: Option<&str>) {
        for (key, value) in stored {
            // Undeclared keys are ignored at render time
            let Some(field) = schema.field(key) else {
                continue;
            };
            if let Err(error) = validate_value(field, value, None) {
                let message = format!("{}: {}", key, error.message);
                self.issues.push(match block_id {
                    Some(block_id) => {
                        PublishIssue::block(IssueReason::InvalidSetting, section_id, block_id, message)
                    }
                    None => PublishIssue::section(IssueReason::InvalidSetting, section_id, message),
                });
            }
        }
    }

    fn unique(&mut self, id: &str) {
        if !self.seen_ids.insert(id.to_string()) && !self.flagged.contains(id) {
            self.issues.push(PublishIssue {
                reason: IssueReason::DuplicateId,
                section_id: None,
                block_id: None,
                message: format!("Identifier {} is used more than once in the graph", id),
            });
        }
    }
}

impl Visitor for PublishChecker<'_> {
    fn visit_composition(&mut self, composition: &Composition) {
        self.sequence(check_sequence(&composition.sections), None);
        for section in &composition.sections {
            self.visit_section(section);
        }
    }

    fn visit_section(&mut self, section: &Section) {
        self.unique(&section.id);

        let Some(schema) = self.registry.section(&section.section_type) else {
            self.issues.push(PublishIssue::section(
                IssueReason::UnknownSectionType,
                &section.id,
                format!("Section type {} is not registered", section.section_type),
            ));
            return;
        };

        self.settings(schema, &section.settings, &section.id, None);

        if let Some(max) = schema.max_blocks {
            if section.blocks.len() > max {
                self.issues.push(PublishIssue::section(
                    IssueReason::TooManyBlocks,
                    &section.id,
                    format!("{} blocks exceed the limit of {}", section.blocks.len(), max),
                ));
            }
        }

        self.sequence(check_sequence(&section.blocks), Some(&section.id));
        walk_section(self, section);
    }

    fn visit_block(&mut self, section: &Section, block: &Block) {
        self.unique(&block.id);

        let Some(block_schema) = self.registry.block(&block.block_type) else {
            self.issues.push(PublishIssue::block(
                IssueReason::UnknownBlockType,
                &section.id,
                &block.id,
                format!("Block type {} is not registered", block.block_type),
            ));
            return;
        };

        let allowed = self
            .registry
            .section(&section.section_type)
            .map_or(false, |s| s.allows_block(&block.block_type));
        if !allowed {
            self.issues.push(PublishIssue::block(
                IssueReason::BlockNotAllowed,
                &section.id,
                &block.id,
                format!(
                    "Section type {} does not allow block type {}",
                    section.section_type, block.block_type
                ),
            ));
        }

        self.settings(block_schema, &block.settings, &section.id, Some(&block.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railspress_common::Block;
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_value(json!({
            "sections": [
                { "type": "faq", "settings": [ { "key": "title", "type": "text", "max_length": 10 } ],
                  "blocks": ["faq_item"], "max_blocks": 1 },
                { "type": "hero", "settings": [] }
            ],
            "blocks": [ { "type": "faq_item", "settings": [] } ]
        }))
        .unwrap()
    }

    fn block(id: &str, position: usize) -> Block {
        Block {
            id: id.to_string(),
            block_type: "faq_item".to_string(),
            position,
            settings: Settings::new(),
        }
    }

    #[test]
    fn test_empty_draft_is_rejected() {
        let issues = check_publishable(&Composition::new(), &registry());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, IssueReason::EmptyDraft);
    }

    #[test]
    fn test_valid_draft_has_no_issues() {
        let mut faq = Section::new("faq-1", "faq");
        faq.blocks.push(block("q1", 0));
        let composition = Composition {
            sections: vec![faq],
        };

        assert!(check_publishable(&composition, &registry()).is_empty());
    }

    #[test]
    fn test_collects_every_issue() {
        let mut faq = Section::new("faq-1", "faq");
        faq.settings.insert("title".into(), json!("far too long a title"));
        faq.blocks.push(block("q1", 0));
        faq.blocks.push(block("q2", 5));

        let mut hero = Section::new("hero-1", "hero");
        hero.position = 1;
        hero.blocks.push(block("q3", 0));

        let mut ghost = Section::new("ghost-1", "ghost");
        ghost.position = 2;

        let composition = Composition {
            sections: vec![faq, hero, ghost],
        };
        let issues = check_publishable(&composition, &registry());
        let reasons: Vec<_> = issues.iter().map(|i| i.reason).collect();

        assert!(reasons.contains(&IssueReason::InvalidSetting));
        assert!(reasons.contains(&IssueReason::TooManyBlocks));
        assert!(reasons.contains(&IssueReason::PositionCorrupt));
        assert!(reasons.contains(&IssueReason::BlockNotAllowed));
        assert!(reasons.contains(&IssueReason::UnknownSectionType));

        let not_allowed = issues
            .iter()
            .find(|i| i.reason == IssueReason::BlockNotAllowed)
            .unwrap();
        assert_eq!(not_allowed.block_id.as_deref(), Some("q3"));
    }

    #[test]
    fn test_duplicate_id_reported_once() {
        let hero = Section::new("hero-1", "hero");
        let mut twin = Section::new("hero-1", "hero");
        twin.position = 1;

        let composition = Composition {
            sections: vec![hero, twin],
        };
        let issues = check_publishable(&composition, &registry());

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, IssueReason::DuplicateId);
        assert_eq!(issues[0].section_id.as_deref(), Some("hero-1"));
    }

    #[test]
    fn test_block_reusing_section_id_is_reported() {
        let mut faq = Section::new("faq-1", "faq");
        faq.blocks.push(block("faq-1", 0));

        let composition = Composition {
            sections: vec![faq],
        };
        let issues = check_publishable(&composition, &registry());

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, IssueReason::DuplicateId);
        assert_eq!(issues[0].section_id, None);
    }
}
