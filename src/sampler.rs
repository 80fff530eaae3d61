//! Index sampling: cardinality statistics used by the query planner.

use ahash::AHashMap;

use crate::config::IndexSamplingConfig;
use crate::error::{IndexError, Result};
use crate::lexical::searcher::PartitionSearcher;
use crate::lexical::segment::IndexSegment;
use crate::structure::ENTITY_ID_KEY;
use crate::task::TaskControl;

/// Result of one sampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSample {
    /// Live entries in the index.
    pub index_size: usize,
    /// Distinct values seen in the sample.
    pub unique_values: usize,
    /// Entries covered by the sample.
    pub sample_size: usize,
}

impl IndexSample {
    /// Sample of `index_size` entries with `unique_values` distinct values among `sample_size` sampled.
    pub fn new(index_size: usize, unique_values: usize, sample_size: usize) -> Self {
        IndexSample {
            index_size,
            unique_values,
            sample_size,
        }
    }
}

/// A sampling strategy bound to a set of searchers and a task control.
pub trait IndexSampler {
    fn sample_index(&self) -> Result<IndexSample>;
}

fn check_cancelled(control: &TaskControl) -> Result<()> {
    if control.is_cancelled() {
        log::debug!("index sampling cancelled");
        return Err(IndexError::cancelled("index dropped while sampling"));
    }
    Ok(())
}

fn live_entries(searchers: &[PartitionSearcher]) -> usize {
    searchers.iter().map(PartitionSearcher::num_docs).sum()
}

/// Sampler for indexes backing a uniqueness constraint: every entry is a
/// distinct value, so only live entries are counted.
#[derive(Debug)]
pub struct UniqueIndexSampler<'a> {
    searchers: &'a [PartitionSearcher],
    control: TaskControl,
}

impl<'a> UniqueIndexSampler<'a> {
    pub fn new(searchers: &'a [PartitionSearcher], control: TaskControl) -> Self {
        UniqueIndexSampler { searchers, control }
    }
}

impl IndexSampler for UniqueIndexSampler<'_> {
    fn sample_index(&self) -> Result<IndexSample> {
        check_cancelled(&self.control)?;
        let size = live_entries(self.searchers);
        Ok(IndexSample::new(size, size, size))
    }
}

/// Sampler grouping live entries by value.
///
/// Distinct values are counted in steps of at most `sample_size_limit`
/// values; the result averages the steps, so memory stays bounded on large
/// indexes at the cost of precision.
#[derive(Debug)]
pub struct NonUniqueIndexSampler<'a> {
    searchers: &'a [PartitionSearcher],
    control: TaskControl,
    sample_size_limit: usize,
}

impl<'a> NonUniqueIndexSampler<'a> {
    pub fn new(
        searchers: &'a [PartitionSearcher],
        control: TaskControl,
        config: &IndexSamplingConfig,
    ) -> Self {
        NonUniqueIndexSampler {
            searchers,
            control,
            sample_size_limit: config.sample_size_limit.max(1),
        }
    }

    fn include_segment<'s>(
        &self,
        segment: &'s IndexSegment,
        steps: &mut SampleSteps<'s>,
    ) -> Result<()> {
        for field in segment.field_names() {
            if field == ENTITY_ID_KEY {
                continue;
            }
            for entry in segment.terms(field) {
                check_cancelled(&self.control)?;
                let live = segment.live_count(entry.postings);
                if live > 0 {
                    steps.include((field, entry.term), live);
                }
            }
        }
        Ok(())
    }
}

impl IndexSampler for NonUniqueIndexSampler<'_> {
    fn sample_index(&self) -> Result<IndexSample> {
        check_cancelled(&self.control)?;
        let mut steps = SampleSteps::new(self.sample_size_limit);
        for searcher in self.searchers {
            self.include_segment(searcher.segment(), &mut steps)?;
        }
        let (unique_values, sample_size) = steps.result();
        Ok(IndexSample::new(
            live_entries(self.searchers),
            unique_values,
            sample_size,
        ))
    }
}

/// Value counts of the current step plus totals of finished steps.
#[derive(Debug)]
struct SampleSteps<'s> {
    limit: usize,
    values: AHashMap<(&'s str, &'s [u8]), usize>,
    finished_steps: usize,
    unique_sum: usize,
    size_sum: usize,
}

impl<'s> SampleSteps<'s> {
    fn new(limit: usize) -> Self {
        SampleSteps {
            limit,
            values: AHashMap::new(),
            finished_steps: 0,
            unique_sum: 0,
            size_sum: 0,
        }
    }

    fn include(&mut self, value: (&'s str, &'s [u8]), count: usize) {
        *self.values.entry(value).or_insert(0) += count;
        if self.values.len() >= self.limit {
            self.next_step();
        }
    }

    fn next_step(&mut self) {
        self.unique_sum += self.values.len();
        self.size_sum += self.values.values().sum::<usize>();
        self.finished_steps += 1;
        self.values.clear();
    }

    fn result(mut self) -> (usize, usize) {
        if !self.values.is_empty() || self.finished_steps == 0 {
            self.next_step();
        }
        (
            self.unique_sum / self.finished_steps,
            self.size_sum / self.finished_steps,
        )
    }
}
