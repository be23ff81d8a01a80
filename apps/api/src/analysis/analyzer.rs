//! Performance analysis over one collection's quiz questions.
//!
//! Only partitions the learner engaged with (at least one recorded answer) count,
//! so a quiz that was generated but never taken does not drag the score down.
//! Inside an engaged partition every question counts: one left unanswered by a
//! partial submission is incorrect, and so is the "I don't know" option. Thresholds are compared as exact
//! rationals so that 3/5 is weak and 4/5 is strong with no float rounding.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::quiz::QuizQuestionRow;
use crate::models::topic::TopicLabel;

/// Weak below 3/5 (60%).
const WEAK_BELOW: (usize, usize) = (3, 5);
/// Strong at or above 4/5 (80%).
const STRONG_FROM: (usize, usize) = (4, 5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Weak,
    Neutral,
    Strong,
}

/// Classifies `correct / total`. An empty tally is neutral.
pub fn classify(correct: usize, total: usize) -> Classification {
    if total == 0 {
        return Classification::Neutral;
    }
    if correct * WEAK_BELOW.1 < total * WEAK_BELOW.0 {
        Classification::Weak
    } else if correct * STRONG_FROM.1 >= total * STRONG_FROM.0 {
        Classification::Strong
    } else {
        Classification::Neutral
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    total: usize,
    correct: usize,
}

impl Tally {
    fn add(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    /// Exact ordering of `correct / total`.
    fn cmp_accuracy(&self, other: &Tally) -> Ordering {
        (self.correct * other.total).cmp(&(other.correct * self.total))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicStats {
    /// Raw topic string, marker included. Suitable as course job input.
    pub topic: String,
    pub label: String,
    pub domain: String,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStats {
    pub partition_index: i32,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub collection_id: i64,
    pub total_questions: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub score_percent: f64,
    pub weak_topics: Vec<String>,
    pub strong_topics: Vec<String>,
    /// Ascending by accuracy, ties by topic.
    pub topics: Vec<TopicStats>,
    pub partitions: Vec<PartitionStats>,
}

pub fn analyze(collection_id: i64, questions: &[QuizQuestionRow]) -> PerformanceReport {
    let engaged: BTreeSet<i32> = questions
        .iter()
        .filter(|q| q.is_answered())
        .map(|q| q.partition_index)
        .collect();

    let mut overall = Tally::default();
    let mut by_topic: BTreeMap<&str, Tally> = BTreeMap::new();
    let mut by_partition: BTreeMap<i32, Tally> = BTreeMap::new();

    for q in questions
        .iter()
        .filter(|q| engaged.contains(&q.partition_index))
    {
        let correct = q.is_correct();
        overall.add(correct);
        by_topic.entry(q.topic.as_str()).or_default().add(correct);
        by_partition.entry(q.partition_index).or_default().add(correct);
    }

    let mut ranked: Vec<(&str, Tally)> = by_topic.into_iter().collect();
    ranked.sort_by(|(a_topic, a), (b_topic, b)| {
        a.cmp_accuracy(b).then_with(|| a_topic.cmp(b_topic))
    });

    let topics: Vec<TopicStats> = ranked
        .into_iter()
        .map(|(topic, tally)| {
            let TopicLabel { label, domain } = TopicLabel::parse(topic);
            TopicStats {
                topic: topic.to_string(),
                label,
                domain,
                total: tally.total,
                correct: tally.correct,
                accuracy: tally.accuracy(),
                classification: classify(tally.correct, tally.total),
            }
        })
        .collect();

    let pick = |class: Classification| {
        topics
            .iter()
            .filter(|t| t.classification == class)
            .map(|t| t.topic.clone())
            .collect::<Vec<_>>()
    };
    let weak_topics = pick(Classification::Weak);
    let strong_topics = pick(Classification::Strong);

    let partitions = by_partition
        .into_iter()
        .map(|(partition_index, tally)| PartitionStats {
            partition_index,
            total: tally.total,
            correct: tally.correct,
            accuracy: tally.accuracy(),
        })
        .collect();

    let score_percent = if overall.total == 0 {
        0.0
    } else {
        (overall.correct * 100) as f64 / overall.total as f64
    };

    PerformanceReport {
        collection_id,
        total_questions: overall.total,
        correct: overall.correct,
        incorrect: overall.total - overall.correct,
        score_percent,
        weak_topics,
        strong_topics,
        topics,
        partitions,
    }
}
