use std::collections::{BTreeMap, BTreeSet};

use indicatif::ProgressBar;
use serde::Serialize;

use crate::evaluator::{Evaluation, Evaluator, FieldStatus, Reason, RecordEvaluation};
use crate::extraction::{Extraction, Record};

use super::device_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    DataFiles,
    Models,
    DeviceInfo,
}

/// Where a record sits in the dump. Ids are not unique across chats, so
/// removals are keyed by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecordKey {
    pub section: Section,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<usize>,
}

impl RecordKey {
    pub fn new(section: Section, index: usize) -> Self {
        Self {
            section,
            index,
            message: None,
        }
    }

    /// The `message`th child of this record.
    pub fn child(self, message: usize) -> Self {
        Self {
            message: Some(message),
            ..self
        }
    }
}

pub trait RecordSource {
    /// Every call starts again from the first record.
    fn records(&self) -> impl Iterator<Item = (RecordKey, &Record)>;
}

pub trait RecordSink {
    fn remove_record(&mut self, key: RecordKey);

    // last to first, so positions not yet removed stay valid
    fn remove_records(&mut self, keys: &BTreeSet<RecordKey>) {
        for key in keys.iter().rev() {
            self.remove_record(*key);
        }
    }
}

impl RecordSource for Extraction {
    fn records(&self) -> impl Iterator<Item = (RecordKey, &Record)> {
        let data_files = self.data_files.iter().enumerate();
        let models = self.models.iter().enumerate();
        data_files
            .map(|(i, r)| (RecordKey::new(Section::DataFiles, i), r))
            .chain(models.map(|(i, r)| (RecordKey::new(Section::Models, i), r)))
    }
}

fn retain_unmarked<T>(items: &mut Vec<T>, mut marked: impl FnMut(usize) -> bool) {
    let mut index = 0;
    items.retain(|_| {
        let keep = !marked(index);
        index += 1;
        keep
    });
}

fn remove_from(records: &mut Vec<Record>, section: Section, keys: &BTreeSet<RecordKey>) {
    // children first, while record positions still match the keys
    for (index, record) in records.iter_mut().enumerate() {
        if let Some(messages) = &mut record.messages {
            let parent = RecordKey::new(section, index);
            retain_unmarked(messages, |m| keys.contains(&parent.child(m)));
        }
    }
    retain_unmarked(records, |i| keys.contains(&RecordKey::new(section, i)));
}

impl RecordSink for Extraction {
    fn remove_record(&mut self, key: RecordKey) {
        self.remove_records(&BTreeSet::from([key]));
    }

    // one pass over each list instead of one per key
    fn remove_records(&mut self, keys: &BTreeSet<RecordKey>) {
        if keys.is_empty() {
            return;
        }

        remove_from(&mut self.data_files, Section::DataFiles, keys);
        remove_from(&mut self.models, Section::Models, keys);
        retain_unmarked(&mut self.device_info, |i| {
            keys.contains(&RecordKey::new(Section::DeviceInfo, i))
        });
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub processed: usize,
    pub removed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SectionSummary {
    pub processed: usize,
    pub removed: usize,
    pub by_category: BTreeMap<String, Tally>,
}

impl SectionSummary {
    fn count(&mut self, category: &str, evaluation: &Evaluation) {
        let tally = self.by_category.entry(category.to_string()).or_default();
        tally.processed += 1;
        self.processed += 1;
        if !evaluation.is_keep() {
            tally.removed += 1;
            self.removed += 1;
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub data_files: SectionSummary,
    pub models: SectionSummary,
    pub chat_messages: SectionSummary,
    pub device_info: SectionSummary,
    /// Records kept only because they could not be evaluated.
    pub failures: usize,
}

impl FilterSummary {
    pub fn total_removed(&self) -> usize {
        self.data_files.removed
            + self.models.removed
            + self.chat_messages.removed
            + self.device_info.removed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionEvaluation {
    #[serde(flatten)]
    pub key: RecordKey,
    #[serde(flatten)]
    pub evaluation: RecordEvaluation,
}

/// Verdicts for a whole extraction, not yet applied.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub summary: FilterSummary,
    pub evaluations: Vec<SectionEvaluation>,
    pub removals: BTreeSet<RecordKey>,
}

fn log_evaluation(label: &str, evaluation: &Evaluation) {
    for line in &evaluation.trace {
        match line.status {
            FieldStatus::Unparseable { .. } => {
                log::warn!("{} `{}`: {}", evaluation.category, label, line)
            }
            _ => log::debug!("\t\t{}", line),
        }
    }

    match &evaluation.reason {
        Reason::EvaluationFailed { error } => log::error!(
            "{} `{}` ({}): {}, keeping it",
            evaluation.category,
            label,
            evaluation.id,
            error
        ),
        reason => log::debug!(
            "\t{} {} `{}`: {}",
            evaluation.verdict,
            evaluation.category,
            label,
            reason
        ),
    }
}

/// Runs the evaluator over every record of `source`.
pub fn evaluate_records<S: RecordSource>(
    source: &S,
    evaluator: &Evaluator,
    progress: &ProgressBar,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for (key, record) in source.records() {
        let (evaluation, category) = match key.section {
            Section::Models => {
                let evaluation = evaluator.evaluate_model(record);
                let category = evaluation.record.category.to_string();
                (evaluation, category)
            }
            _ => {
                let evaluation = RecordEvaluation {
                    record: evaluator.evaluate_data_file(record),
                    children: Vec::new(),
                };
                let category = record.category.clone().unwrap_or_else(|| "DataFile".to_string());
                (evaluation, category)
            }
        };
        progress.set_message(category.clone());

        log_evaluation(record.label(), &evaluation.record);
        let summary = match key.section {
            Section::Models => &mut outcome.summary.models,
            _ => &mut outcome.summary.data_files,
        };
        summary.count(&category, &evaluation.record);
        if !evaluation.record.is_keep() {
            outcome.removals.insert(key);
        }

        let messages = record.messages.iter().flatten();
        for (m, (message, child)) in messages.zip(evaluation.children.iter()).enumerate() {
            log_evaluation(message.label(), child);
            outcome.summary.chat_messages.count(&category, child);
            if !child.is_keep() {
                outcome.removals.insert(key.child(m));
            }
        }

        outcome.summary.failures += std::iter::once(&evaluation.record)
            .chain(evaluation.children.iter())
            .filter(|e| matches!(e.reason, Reason::EvaluationFailed { .. }))
            .count();

        outcome.evaluations.push(SectionEvaluation { key, evaluation });
        progress.inc(1);
    }

    outcome
}

/// Evaluates records and device info without changing anything.
pub fn plan(extraction: &Extraction, evaluator: &Evaluator, progress: &ProgressBar) -> FilterOutcome {
    log::info!(
        "Date range start={} end={}",
        evaluator.policy().range.start(),
        evaluator.policy().range.end()
    );

    let mut outcome = evaluate_records(extraction, evaluator, progress);

    for (index, entry) in extraction.device_info.iter().enumerate() {
        let Some(evaluation) =
            device_info::evaluate_entry(index, entry, &evaluator.policy().range)
        else {
            continue;
        };

        let key = RecordKey::new(Section::DeviceInfo, index);
        log_evaluation(&entry.name, &evaluation);
        outcome.summary.device_info.count(&entry.name, &evaluation);
        if !evaluation.is_keep() {
            outcome.removals.insert(key);
        }
        outcome.evaluations.push(SectionEvaluation {
            key,
            evaluation: RecordEvaluation {
                record: evaluation,
                children: Vec::new(),
            },
        });
    }

    log::info!("Items to remove: {}", outcome.summary.total_removed());
    outcome
}

/// Removes everything `outcome` marked for removal.
pub fn apply<S: RecordSink>(sink: &mut S, outcome: &FilterOutcome) {
    sink.remove_records(&outcome.removals);
}
