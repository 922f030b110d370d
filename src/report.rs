//! Counting labels into a report with percentages and display colors.

use crate::classifier::{ERROR, Label, NO_TEXT};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How labels are mapped to display colors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorScheme {
    /// Fixed colors for the known emotion labels; anything else falls back
    /// to evenly spaced hues
    #[default]
    Palette,
    /// Hues spaced evenly around the color wheel for whatever labels are
    /// present
    Hues,
}

const SATURATION: f64 = 0.65;
const LIGHTNESS: f64 = 0.55;

/// Colors for the GoEmotions vocabulary and the two sentinel labels.
const PALETTE: &[(&str, &str)] = &[
    ("admiration", "#f4a261"),
    ("amusement", "#ffb703"),
    ("anger", "#d62828"),
    ("annoyance", "#e76f51"),
    ("approval", "#90be6d"),
    ("caring", "#f28482"),
    ("confusion", "#9d8189"),
    ("curiosity", "#4cc9f0"),
    ("desire", "#c9184a"),
    ("disappointment", "#6c757d"),
    ("disapproval", "#8d5524"),
    ("disgust", "#6a994e"),
    ("embarrassment", "#ff8fab"),
    ("excitement", "#ff6d00"),
    ("fear", "#5a189a"),
    ("gratitude", "#2a9d8f"),
    ("grief", "#343a40"),
    ("joy", "#ffd60a"),
    ("love", "#ff4d6d"),
    ("nervousness", "#b5838d"),
    ("optimism", "#80ed99"),
    ("pride", "#7209b7"),
    ("realization", "#4361ee"),
    ("relief", "#a8dadc"),
    ("remorse", "#774936"),
    ("sadness", "#1d3557"),
    ("surprise", "#f15bb5"),
    ("neutral", "#adb5bd"),
    (NO_TEXT, "#dee2e6"),
    (ERROR, "#9b2226"),
];

/// One row of the report table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportEntry {
    pub label: String,
    pub count: usize,
    pub percentage: f64,
    pub color: String,
}

/// Counts, percentages and colors over one classification result.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub total: usize,
    /// Ordered by count (highest first), ties by label
    pub entries: Vec<ReportEntry>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    /// Aggregates `labels` into a report.
    ///
    /// An empty label list gives an empty report with a total of 0.
    ///
    /// # Examples
    /// ```
    /// use emotion_report::classifier::Label;
    /// use emotion_report::report::{ColorScheme, Report};
    ///
    /// let labels = vec![Label::Emotion("joy".into()), Label::NoText, Label::NoText, Label::NoText];
    /// let report = Report::from_labels(&labels, ColorScheme::Palette);
    /// assert_eq!(report.total, 4);
    /// assert_eq!(report.percentage("NO_TEXT"), Some(75.0));
    /// assert_eq!(report.percentage("joy"), Some(25.0));
    /// ```
    pub fn from_labels(labels: &[Label], scheme: ColorScheme) -> Self {
        let counts = count_labels(labels);
        let total: usize = counts.values().sum();
        let colors = assign_colors(counts.keys().map(String::as_str), scheme);

        let mut entries: Vec<ReportEntry> = counts
            .into_iter()
            .map(|(label, count)| ReportEntry {
                color: colors.get(&label).cloned().unwrap_or_default(),
                percentage: 100.0 * count as f64 / total as f64,
                label,
                count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

        Report {
            total,
            entries,
            generated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn get(&self, label: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn count(&self, label: &str) -> Option<usize> {
        self.get(label).map(|e| e.count)
    }

    pub fn percentage(&self, label: &str) -> Option<f64> {
        self.get(label).map(|e| e.percentage)
    }
}

/// Occurrences per distinct label.
pub fn count_labels(labels: &[Label]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

/// Maps each distinct label to a `#rrggbb` color.
///
/// The result depends only on the set of labels, never on their order or
/// counts.
pub fn assign_colors<'a>(
    labels: impl IntoIterator<Item = &'a str>,
    scheme: ColorScheme,
) -> HashMap<String, String> {
    let distinct: BTreeSet<&str> = labels.into_iter().collect();

    let (mut colors, unassigned): (HashMap<String, String>, Vec<&str>) = match scheme {
        ColorScheme::Hues => (HashMap::new(), distinct.into_iter().collect()),
        ColorScheme::Palette => {
            let mut colors = HashMap::new();
            let mut unassigned = Vec::new();
            for label in distinct {
                match palette_color(label) {
                    Some(color) => {
                        colors.insert(label.to_string(), color.to_string());
                    }
                    None => unassigned.push(label),
                }
            }
            (colors, unassigned)
        }
    };

    colors.extend(spaced_hues(&unassigned));
    colors
}

pub fn palette_color(label: &str) -> Option<&'static str> {
    PALETTE
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, color)| *color)
}

// `labels` must already be sorted for the mapping to be stable
fn spaced_hues(labels: &[&str]) -> Vec<(String, String)> {
    let n = labels.len();
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let hue = 360.0 * i as f64 / n as f64;
            (label.to_string(), hsl_to_hex(hue, SATURATION, LIGHTNESS))
        })
        .collect()
}

/// Converts HSL (hue in degrees, saturation and lightness in 0..=1) to
/// `#rrggbb`.
pub fn hsl_to_hex(hue: f64, saturation: f64, lightness: f64) -> String {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = lightness - c / 2.0;

    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

/// Parses `#rrggbb` back into its channels.
pub(crate) fn parse_hex(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emotion(s: &str) -> Label {
        Label::Emotion(s.to_string())
    }

    #[test]
    fn counts_sum_to_total() {
        let labels = vec![emotion("joy"), emotion("anger"), emotion("joy"), Label::Error, Label::NoText];
        let report = Report::from_labels(&labels, ColorScheme::Palette);

        assert_eq!(report.total, labels.len());
        assert_eq!(report.entries.iter().map(|e| e.count).sum::<usize>(), labels.len());
        assert_eq!(report.count("joy"), Some(2));
        assert_eq!(report.count("ERROR"), Some(1));
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let labels: Vec<Label> = ["joy", "anger", "fear", "joy", "love", "fear", "joy"]
            .iter()
            .map(|s| emotion(s))
            .collect();
        let report = Report::from_labels(&labels, ColorScheme::Hues);
        let sum: f64 = report.entries.iter().map(|e| e.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_labels_give_empty_report() {
        let report = Report::from_labels(&[], ColorScheme::Palette);
        assert!(report.is_empty());
        assert!(report.entries.is_empty());
    }

    #[test]
    fn entries_ordered_by_count_then_label() {
        let labels = vec![emotion("love"), emotion("anger"), emotion("joy"), emotion("joy")];
        let report = Report::from_labels(&labels, ColorScheme::Palette);
        let order: Vec<&str> = report.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(order, vec!["joy", "anger", "love"]);
    }

    #[test]
    fn palette_colors_known_labels() {
        let colors = assign_colors(["joy", "NO_TEXT", "ERROR"], ColorScheme::Palette);
        assert_eq!(colors["joy"], "#ffd60a");
        assert_eq!(colors["NO_TEXT"], "#dee2e6");
        assert_eq!(colors["ERROR"], "#9b2226");
    }

    #[test]
    fn palette_falls_back_to_hues_for_unknown_labels() {
        let colors = assign_colors(["joy", "LABEL_7"], ColorScheme::Palette);
        assert_eq!(colors["LABEL_7"], hsl_to_hex(0.0, SATURATION, LIGHTNESS));
    }

    #[test]
    fn hue_colors_depend_only_on_the_label_set() {
        let first = assign_colors(["joy", "anger", "fear"], ColorScheme::Hues);
        let second = assign_colors(["fear", "joy", "anger", "joy"], ColorScheme::Hues);
        assert_eq!(first, second);

        let a = Report::from_labels(&[emotion("joy"), emotion("fear")], ColorScheme::Hues);
        let b = Report::from_labels(
            &[emotion("fear"), emotion("fear"), emotion("fear"), emotion("joy")],
            ColorScheme::Hues,
        );
        assert_eq!(a.get("joy").unwrap().color, b.get("joy").unwrap().color);
        assert_eq!(a.get("fear").unwrap().color, b.get("fear").unwrap().color);
    }

    #[test]
    fn hues_are_distinct() {
        let colors = assign_colors(["a", "b", "c", "d", "e", "f"], ColorScheme::Hues);
        let unique: BTreeSet<&String> = colors.values().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn hsl_conversion() {
        assert_eq!(hsl_to_hex(0.0, 1.0, 0.5), "#ff0000");
        assert_eq!(hsl_to_hex(120.0, 1.0, 0.5), "#00ff00");
        assert_eq!(hsl_to_hex(240.0, 1.0, 0.5), "#0000ff");
        assert_eq!(hsl_to_hex(0.0, 0.0, 1.0), "#ffffff");
        assert_eq!(hsl_to_hex(360.0, 1.0, 0.5), "#ff0000");
    }

    #[test]
    fn hex_round_trip() {
        assert_eq!(parse_hex("#ffd60a"), Some((0xff, 0xd6, 0x0a)));
        assert_eq!(parse_hex("ffd60a"), None);
        assert_eq!(parse_hex("#12"), None);
    }
}
