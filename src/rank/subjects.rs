// src/rank/subjects.rs
//! Subject tagging: every rule in the vocabulary's subject table is checked
//! independently against the lower-cased text; all matching tags are collected.

use std::collections::BTreeSet;

use super::vocab::{TopicVocab, OTHER_SUBJECT};

/// Never returns an empty set.
pub fn extract_subjects(text: &str, vocab: &TopicVocab) -> BTreeSet<String> {
    let text_lc = text.to_lowercase();
    let mut tags: BTreeSet<String> = vocab
        .subjects
        .iter()
        .filter(|rule| rule.triggers.matches(&text_lc))
        .map(|rule| rule.tag.clone())
        .collect();

    if tags.is_empty() {
        let fallback = if vocab.primary.mentions(&text_lc) {
            vocab.primary.fallback_subject.clone()
        } else if vocab.secondary.mentions(&text_lc) {
            vocab.secondary.fallback_subject.clone()
        } else {
            OTHER_SUBJECT.to_string()
        };
        tags.insert(fallback);
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_matching_tag() {
        let v = TopicVocab::default_seed();
        let tags = extract_subjects("Bo Nix contract extension talks while Sean Payton watches", &v);
        assert!(tags.contains("Bo Nix"));
        assert!(tags.contains("Sean Payton"));
        assert!(tags.contains("Contracts"));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn falls_back_to_group_generic_tag() {
        let v = TopicVocab::default_seed();
        assert_eq!(
            extract_subjects("Broncos looked sharp today", &v),
            BTreeSet::from(["Broncos General".to_string()])
        );
        assert_eq!(
            extract_subjects("Nuggets looked sharp today", &v),
            BTreeSet::from(["Nuggets General".to_string()])
        );
        assert_eq!(
            extract_subjects("Nothing to see", &v),
            BTreeSet::from([OTHER_SUBJECT.to_string()])
        );
        assert_eq!(
            extract_subjects("", &v),
            BTreeSet::from([OTHER_SUBJECT.to_string()])
        );
    }

    #[test]
    fn triggers_do_not_fire_inside_other_words() {
        let v = TopicVocab::default_seed();
        assert_eq!(
            extract_subjects("Broncos pull off a miracle comeback", &v),
            BTreeSet::from(["Broncos General".to_string()])
        );
        let tags = extract_subjects("Broncos lose Surtain to a torn ACL", &v);
        assert!(tags.contains("Injuries"));
        assert!(tags.contains("Defense"));
    }

    #[test]
    fn primary_generic_wins_when_both_groups_named() {
        let v = TopicVocab::default_seed();
        let tags = extract_subjects("Broncos and Nuggets both home tonight", &v);
        assert_eq!(tags, BTreeSet::from(["Broncos General".to_string()]));
    }
}
