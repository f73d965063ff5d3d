use crate::model::*;

/// Visitor pattern for traversing a composition graph immutably
///
/// Default implementations walk the entire graph in position order.
/// Override specific visit_* methods to act on particular nodes.
pub trait Visitor: Sized {
    fn visit_composition(&mut self, composition: &Composition) {
        walk_composition(self, composition);
    }

    fn visit_section(&mut self, section: &Section) {
        walk_section(self, section);
    }

    fn visit_block(&mut self, _section: &Section, _block: &Block) {
        // Leaf node, no children to walk
    }
}

/// Mutable visitor for transforming a composition graph in place
pub trait VisitorMut: Sized {
    fn visit_composition_mut(&mut self, composition: &mut Composition) {
        walk_composition_mut(self, composition);
    }

    fn visit_section_mut(&mut self, section: &mut Section) {
        walk_section_mut(self, section);
    }

    fn visit_block_mut(&mut self, _section_id: &str, _block: &mut Block) {
        // Leaf node, no children to walk
    }
}

// Default walk implementations for immutable visitor

pub fn walk_composition<V: Visitor>(visitor: &mut V, composition: &Composition) {
    for section in &composition.sections {
        visitor.visit_section(section);
    }
}

pub fn walk_section<V: Visitor>(visitor: &mut V, section: &Section) {
    for block in &section.blocks {
        visitor.visit_block(section, block);
    }
}

// Default walk implementations for mutable visitor

pub fn walk_composition_mut<V: VisitorMut>(visitor: &mut V, composition: &mut Composition) {
    for section in &mut composition.sections {
        visitor.visit_section_mut(section);
    }
}

pub fn walk_section_mut<V: VisitorMut>(visitor: &mut V, section: &mut Section) {
    let section_id = section.id.clone();
    for block in &mut section.blocks {
        visitor.visit_block_mut(&section_id, block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TypeCounter {
        sections: usize,
        blocks: usize,
    }

    impl Visitor for TypeCounter {
        fn visit_section(&mut self, section: &Section) {
            self.sections += 1;
            walk_section(self, section);
        }

        fn visit_block(&mut self, _section: &Section, _block: &Block) {
            self.blocks += 1;
        }
    }

    struct ClearSettings;

    impl VisitorMut for ClearSettings {
        fn visit_section_mut(&mut self, section: &mut Section) {
            section.settings.clear();
            walk_section_mut(self, section);
        }

        fn visit_block_mut(&mut self, _section_id: &str, block: &mut Block) {
            block.settings.clear();
        }
    }

    fn sample() -> Composition {
        let mut faq = Section::new("faq", "accordion");
        faq.settings
            .insert("title".to_string(), serde_json::json!("FAQ"));
        for i in 0..2 {
            faq.blocks.push(Block {
                id: format!("faq-{}", i),
                block_type: "item".to_string(),
                position: i,
                settings: [("q".to_string(), serde_json::json!("?"))].into(),
            });
        }
        Composition {
            sections: vec![Section::new("hero", "hero"), faq],
        }
    }

    #[test]
    fn test_visitor_counts_every_node() {
        let mut counter = TypeCounter {
            sections: 0,
            blocks: 0,
        };
        counter.visit_composition(&sample());

        assert_eq!(counter.sections, 2);
        assert_eq!(counter.blocks, 2);
    }

    #[test]
    fn test_visitor_mut_reaches_blocks() {
        let mut composition = sample();
        ClearSettings.visit_composition_mut(&mut composition);

        let faq = composition.find_section("faq").unwrap();
        assert!(faq.settings.is_empty());
        assert!(faq.blocks.iter().all(|b| b.settings.is_empty()));
    }
}
