//! Feature distillation: deduplicating detections across tile boundaries.
//!
//! Tiles overlap by design, so an object near a tile edge is detected twice.
//! Distillation groups features by their dominant class and suppresses (NMS)
//! or decays (Soft-NMS) overlapping lower-score detections, using the
//! full-image pixel `imageBBox` for IoU. All comparisons are deterministic:
//! ties break on score, then bbox min-x, min-y, then input order.

use crate::{Bounds, Feature};
use anyhow::{Result, bail};
use std::{cmp::Ordering, collections::BTreeMap, fmt::Display};

/// Default IoU above which a detection counts as a duplicate.
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;
/// Default Soft-NMS decay width.
pub const DEFAULT_SIGMA: f64 = 0.5;
/// Default Soft-NMS score below which a decayed detection is dropped.
pub const DEFAULT_SCORE_FLOOR: f64 = 0.001;

/// How aggregated region features are deduplicated.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DistillationMode {
	/// Keep every detection.
	#[default]
	None,
	/// Greedy non-maximal suppression: drop detections whose IoU with an
	/// already-selected detection of the same class exceeds the threshold.
	Nms { iou_threshold: f64 },
	/// Soft-NMS: decay overlapping scores by `exp(-iou^2 / sigma)` instead of
	/// dropping, preserving the original score as `rawScore`. Detections
	/// decayed below `score_floor` are dropped.
	SoftNms { sigma: f64, score_floor: f64 },
}

impl DistillationMode {
	/// Parses a mode name as it appears in requests (`NONE`, `NMS`, `SOFT-NMS`).
	pub fn parse_str(value: &str) -> Result<Self> {
		Ok(match value.to_uppercase().trim() {
			"NONE" => DistillationMode::None,
			"NMS" => DistillationMode::Nms {
				iou_threshold: DEFAULT_IOU_THRESHOLD,
			},
			"SOFT-NMS" | "SOFT_NMS" | "SOFTNMS" => DistillationMode::SoftNms {
				sigma: DEFAULT_SIGMA,
				score_floor: DEFAULT_SCORE_FLOOR,
			},
			_ => bail!("Unknown feature distillation mode '{value}'. Expected: NONE, NMS or SOFT-NMS"),
		})
	}
}

impl Display for DistillationMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			DistillationMode::None => "NONE",
			DistillationMode::Nms { .. } => "NMS",
			DistillationMode::SoftNms { .. } => "SOFT-NMS",
		})
	}
}

/// One comparable detection within a class group.
#[derive(Clone, Copy, Debug)]
struct Entry {
	/// Index into the input feature vector.
	index: usize,
	/// Current (possibly decayed) dominant-class score.
	score: f64,
	bounds: Bounds,
}

impl Entry {
	/// Score descending, then bbox min-x, min-y, then input order.
	fn cmp(&self, other: &Entry) -> Ordering {
		other
			.score
			.total_cmp(&self.score)
			.then(self.bounds.min_x.total_cmp(&other.bounds.min_x))
			.then(self.bounds.min_y.total_cmp(&other.bounds.min_y))
			.then(self.index.cmp(&other.index))
	}
}

/// Deduplicates a region's aggregated feature set.
///
/// Features without a dominant class or without pixel bounds cannot be
/// compared and pass through untouched. The output preserves input order;
/// under plain NMS it is always a subset of the input.
#[must_use]
pub fn distill_features(mut features: Vec<Feature>, mode: &DistillationMode) -> Vec<Feature> {
	match *mode {
		DistillationMode::None => features,
		DistillationMode::Nms { iou_threshold } => {
			let keep = select_nms(&features, iou_threshold);
			features
				.into_iter()
				.enumerate()
				.filter(|(index, _)| keep[*index])
				.map(|(_, feature)| feature)
				.collect()
		}
		DistillationMode::SoftNms { sigma, score_floor } => {
			let decayed = select_soft_nms(&features, sigma, score_floor);
			let mut result = Vec::with_capacity(features.len());
			for (index, mut feature) in features.drain(..).enumerate() {
				match decayed[index] {
					Selection::Keep => result.push(feature),
					Selection::KeepWithScore(score) => {
						apply_decayed_score(&mut feature, score);
						result.push(feature);
					}
					Selection::Drop => {}
				}
			}
			result
		}
	}
}

/// Groups comparable features by dominant class IRI.
fn class_groups(features: &[Feature]) -> (BTreeMap<&str, Vec<Entry>>, Vec<bool>) {
	let mut groups: BTreeMap<&str, Vec<Entry>> = BTreeMap::new();
	// Features that cannot participate in IoU comparison are kept as-is.
	let mut passthrough = vec![false; features.len()];

	for (index, feature) in features.iter().enumerate() {
		match (feature.dominant_class(), feature.image_bounds()) {
			(Some(class), Some(bounds)) => {
				groups.entry(&class.iri).or_default().push(Entry {
					index,
					score: class.score,
					bounds,
				});
			}
			_ => passthrough[index] = true,
		}
	}
	(groups, passthrough)
}

fn select_nms(features: &[Feature], iou_threshold: f64) -> Vec<bool> {
	let (groups, mut keep) = class_groups(features);

	for (_, mut entries) in groups {
		entries.sort_by(Entry::cmp);
		while !entries.is_empty() {
			let top = entries.remove(0);
			keep[top.index] = true;
			entries.retain(|candidate| top.bounds.iou(&candidate.bounds) <= iou_threshold);
		}
	}
	keep
}

/// Outcome of Soft-NMS for one input feature.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Selection {
	Keep,
	KeepWithScore(f64),
	Drop,
}

fn select_soft_nms(features: &[Feature], sigma: f64, score_floor: f64) -> Vec<Selection> {
	let (groups, passthrough) = class_groups(features);

	let mut selection: Vec<Selection> = passthrough
		.iter()
		.map(|pass| if *pass { Selection::Keep } else { Selection::Drop })
		.collect();

	for (_, mut entries) in groups {
		while !entries.is_empty() {
			entries.sort_by(Entry::cmp);
			let top = entries.remove(0);
			selection[top.index] = Selection::KeepWithScore(top.score);
			for candidate in &mut entries {
				let iou = top.bounds.iou(&candidate.bounds);
				if iou > 0.0 {
					candidate.score *= (-iou * iou / sigma).exp();
				}
			}
			entries.retain(|candidate| candidate.score >= score_floor);
		}
	}
	selection
}

/// Writes the decayed score into the dominant class, preserving the original
/// as `rawScore`.
fn apply_decayed_score(feature: &mut Feature, score: f64) {
	let Some(dominant) = dominant_class_index(feature) else {
		return;
	};
	let class = &mut feature.properties.feature_classes[dominant];
	if class.raw_score.is_none() {
		class.raw_score = Some(class.score);
	}
	class.score = score;
}

fn dominant_class_index(feature: &Feature) -> Option<usize> {
	let mut best: Option<usize> = None;
	for (index, class) in feature.properties.feature_classes.iter().enumerate() {
		if best.is_none_or(|b| class.score > feature.properties.feature_classes[b].score) {
			best = Some(index);
		}
	}
	best
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
