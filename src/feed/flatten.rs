use std::collections::HashMap;

use super::opml::Outline;

/// Feed outlines filed under one category label.
///
/// `label == None` is the unfiled group, imported into the root category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineGroup {
    pub label: Option<String>,
    pub outlines: Vec<Outline>,
}

/// Feed outlines grouped by category, in first-appearance order of the
/// groups and document order within each group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatOutlines {
    groups: Vec<OutlineGroup>,
    index: HashMap<Option<String>, usize>,
}

impl FlatOutlines {
    fn push(&mut self, label: Option<&str>, outline: Outline) {
        let key = label.map(str::to_owned);
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(OutlineGroup {
                    label: key.clone(),
                    outlines: Vec::new(),
                });
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].outlines.push(outline);
    }

    /// Total number of feed outlines across all groups.
    pub fn feed_count(&self) -> usize {
        self.groups.iter().map(|g| g.outlines.len()).sum()
    }

    pub fn groups(&self) -> &[OutlineGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<OutlineGroup> {
        self.groups
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Group every feed outline of a tree under its category label.
///
/// A feed outline (one with `xmlUrl`) is filed under the label of the nearest
/// enclosing outline that is not itself a feed; top-level feeds, and feeds
/// whose enclosing outline has no label, are unfiled. Outlines nested inside
/// a feed keep the feed's grouping. Returned leaves carry no children.
///
/// The walk keeps a stack of sibling iterators instead of recursing, so
/// the depth of the input does not grow the call stack.
pub fn flatten(outlines: &[Outline]) -> FlatOutlines {
    let mut flat = FlatOutlines::default();
    let mut stack: Vec<(std::slice::Iter<'_, Outline>, Option<&str>)> =
        vec![(outlines.iter(), None)];

    while let Some((siblings, label)) = stack.last_mut() {
        let label = *label;
        let Some(outline) = siblings.next() else {
            stack.pop();
            continue;
        };

        if outline.is_feed() {
            flat.push(label, leaf(outline));
            if !outline.children.is_empty() {
                stack.push((outline.children.iter(), label));
            }
        } else if !outline.children.is_empty() {
            stack.push((outline.children.iter(), outline.label()));
        }
    }

    flat
}

fn leaf(outline: &Outline) -> Outline {
    Outline {
        text: outline.text.clone(),
        title: outline.title.clone(),
        xml_url: outline.xml_url.clone(),
        html_url: outline.html_url.clone(),
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn feed(text: &str) -> Outline {
        Outline {
            text: Some(text.to_string()),
            xml_url: Some(format!("https://{}.example.com/rss", text.to_lowercase())),
            ..Outline::default()
        }
    }

    fn folder(text: Option<&str>, children: Vec<Outline>) -> Outline {
        Outline {
            text: text.map(str::to_string),
            children,
            ..Outline::default()
        }
    }

    fn labels(flat: &FlatOutlines) -> Vec<(Option<&str>, Vec<&str>)> {
        flat.groups()
            .iter()
            .map(|g| {
                (
                    g.label.as_deref(),
                    g.outlines.iter().filter_map(|o| o.label()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_groups_by_enclosing_label() {
        let tree = vec![
            folder(Some("Tech"), vec![feed("A"), feed("B")]),
            folder(Some("News"), vec![feed("C")]),
        ];

        let flat = flatten(&tree);
        assert_eq!(flat.feed_count(), 3);
        assert_eq!(flat.len(), 2);
        assert_eq!(
            labels(&flat),
            vec![(Some("Tech"), vec!["A", "B"]), (Some("News"), vec!["C"])]
        );
    }

    #[test]
    fn test_top_level_feeds_are_unfiled() {
        let tree = vec![
            feed("Loose"),
            folder(Some("Tech"), vec![feed("A")]),
            feed("Other"),
        ];

        let flat = flatten(&tree);
        assert_eq!(
            labels(&flat),
            vec![(None, vec!["Loose", "Other"]), (Some("Tech"), vec!["A"])]
        );
    }

    #[test]
    fn test_same_label_in_two_places_merges() {
        let tree = vec![
            folder(Some("Tech"), vec![feed("A")]),
            folder(Some("News"), vec![feed("B")]),
            folder(Some("Tech"), vec![feed("C")]),
        ];

        let flat = flatten(&tree);
        assert_eq!(
            labels(&flat),
            vec![(Some("Tech"), vec!["A", "C"]), (Some("News"), vec!["B"])]
        );
    }

    #[test]
    fn test_nested_folder_uses_innermost_label() {
        let tree = vec![folder(
            Some("Outer"),
            vec![feed("A"), folder(Some("Inner"), vec![feed("B")])],
        )];

        let flat = flatten(&tree);
        assert_eq!(
            labels(&flat),
            vec![(Some("Outer"), vec!["A"]), (Some("Inner"), vec!["B"])]
        );
    }

    #[test]
    fn test_unlabelled_folder_is_unfiled() {
        let tree = vec![folder(None, vec![feed("A")])];
        let flat = flatten(&tree);
        assert_eq!(labels(&flat), vec![(None, vec!["A"])]);
    }

    #[test]
    fn test_title_used_when_text_missing() {
        let tree = vec![Outline {
            title: Some("Titled".to_string()),
            children: vec![feed("A")],
            ..Outline::default()
        }];
        let flat = flatten(&tree);
        assert_eq!(flat.groups()[0].label.as_deref(), Some("Titled"));
    }

    #[test]
    fn test_children_of_feed_keep_feed_grouping() {
        let mut parent = feed("A");
        parent.children.push(feed("B"));
        let tree = vec![folder(Some("Tech"), vec![parent])];

        let flat = flatten(&tree);
        assert_eq!(labels(&flat), vec![(Some("Tech"), vec!["A", "B"])]);
        assert!(flat.groups()[0].outlines[0].children.is_empty());
    }

    #[test]
    fn test_empty_folders_produce_no_groups() {
        let tree = vec![folder(Some("Empty"), vec![]), folder(None, vec![])];
        let flat = flatten(&tree);
        assert!(flat.is_empty());
        assert_eq!(flat.feed_count(), 0);
    }

    fn count_feeds(outlines: &[Outline]) -> usize {
        outlines
            .iter()
            .map(|o| usize::from(o.is_feed()) + count_feeds(&o.children))
            .sum()
    }

    fn arb_outline() -> impl Strategy<Value = Outline> {
        let leaf = (
            prop::option::of("[A-C]"),
            prop::option::of("https://[a-z]{1,4}\\.example\\.com/rss"),
        )
            .prop_map(|(text, xml_url)| Outline {
                text,
                xml_url,
                ..Outline::default()
            });
        leaf.prop_recursive(4, 32, 5, |inner| {
            (
                prop::option::of("[A-C]"),
                prop::option::of("https://[a-z]{1,4}\\.example\\.com/rss"),
                prop::collection::vec(inner, 0..5),
            )
                .prop_map(|(text, xml_url, children)| Outline {
                    text,
                    xml_url,
                    children,
                    ..Outline::default()
                })
        })
    }

    proptest! {
        #[test]
        fn prop_flatten_conserves_feed_count(tree in prop::collection::vec(arb_outline(), 0..6)) {
            let flat = flatten(&tree);
            prop_assert_eq!(flat.feed_count(), count_feeds(&tree));
            prop_assert!(flat.groups().iter().all(|g| !g.outlines.is_empty()));
            prop_assert!(flat.groups().iter().flat_map(|g| &g.outlines).all(Outline::is_feed));
        }

        #[test]
        fn prop_group_labels_are_unique(tree in prop::collection::vec(arb_outline(), 0..6)) {
            let flat = flatten(&tree);
            let mut seen = std::collections::HashSet::new();
            for group in flat.groups() {
                prop_assert!(seen.insert(group.label.clone()));
            }
        }
    }
}
