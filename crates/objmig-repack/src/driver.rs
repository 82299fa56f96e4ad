use std::io::Read;
use std::time::{Duration, Instant};

use objmig_store::{PackWriter, StoreResult, StreamSource};
use objmig_types::{NewHashkey, ObjectId, OldHashkey};
use serde::Serialize;
use tracing::debug;

use crate::cache::BoundedCache;
use crate::config::RepackConfig;
use crate::error::{RepackError, RepackResult};
use crate::mapping::MappingSink;
use crate::planner::Group;

/// Counters collected while repacking one group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    /// Index of the group in its plan.
    pub group: usize,
    /// Objects received from the stream source.
    pub objects: usize,
    /// Objects larger than the budget, written on their own.
    pub direct_writes: usize,
    /// Flushes forced by an object that did not fit the cache. The final
    /// flush is not counted.
    pub flushes: usize,
    /// Non-empty batches handed to the pack writer.
    pub pack_writer_calls: usize,
    /// Content bytes handed to the pack writer.
    pub bytes_written: u64,
    /// Highest number of bytes held by the cache at any point.
    pub peak_buffered: u64,
    /// Time spent inside the pack writer.
    pub write_time: Duration,
    /// Wall time for the whole group.
    pub elapsed: Duration,
}

/// Streams a group of objects once and moves them into a pack writer
/// without holding more than `memory_budget` bytes of content.
///
/// Per object, in the order the source yields them:
///
/// 1. larger than the budget: written alone straight from its stream, the
///    cache is left as it is;
/// 2. does not fit next to what is cached: the cache is written as one
///    batch, then the object is buffered;
/// 3. otherwise: buffered.
///
/// Whatever is left in the cache is written when the source is exhausted.
/// Every batch is recorded positionally into the mapping sink.
pub struct RepackDriver<'w, W: PackWriter + ?Sized> {
    writer: &'w W,
    config: RepackConfig,
}

impl<'w, W: PackWriter + ?Sized> RepackDriver<'w, W> {
    pub fn new(writer: &'w W, config: RepackConfig) -> Self {
        Self { writer, config }
    }

    pub fn config(&self) -> &RepackConfig {
        &self.config
    }

    /// Repack every object of `group` from `source`.
    ///
    /// On error the group is aborted. Pairs recorded by earlier batches of
    /// the group stay in the sink; buffered objects are dropped.
    pub fn repack_group<S, M>(
        &self,
        source: &S,
        group: &Group,
        sink: &mut M,
    ) -> RepackResult<GroupReport>
    where
        S: StreamSource + ?Sized,
        M: MappingSink + ?Sized,
    {
        let start = Instant::now();
        let budget = self.config.memory_budget;
        let mut report = GroupReport {
            group: group.index(),
            ..GroupReport::default()
        };
        let mut cache = BoundedCache::new(budget);
        let ids: Vec<ObjectId> = group.keys().iter().map(OldHashkey::object_id).collect();

        source.stream_objects::<RepackError, _>(&ids, |mut obj| {
            report.objects += 1;
            let old = OldHashkey::new(obj.id());
            let size = obj.size();

            if size > budget {
                debug!(object = %old.short_hex(), size, budget, "direct write of object");
                let mut checked = obj.checked_reader()?;
                let written = {
                    let mut streams: [&mut dyn Read; 1] = [&mut checked];
                    self.write(&mut streams, size, &mut report)
                };
                // The writer only sees an io::Error when the source side fails.
                let new = match written {
                    Ok(new) => {
                        checked.finish().map_err(RepackError::SourceReadFailure)?;
                        new
                    }
                    Err(err) => {
                        return Err(match checked.into_failure() {
                            Some(source) => RepackError::SourceReadFailure(source),
                            None => RepackError::WriteFailure(err),
                        });
                    }
                };
                sink.record(&[old], &new)?;
                report.direct_writes += 1;
                return Ok(());
            }

            if !cache.is_empty() && !cache.fits(size) {
                debug!(
                    objects = cache.len(),
                    buffered = cache.total_size(),
                    "flushing cache"
                );
                self.flush(&mut cache, sink, &mut report)?;
                report.flushes += 1;
            }

            let content = obj.read_to_vec()?;
            cache.add(old, content)?;
            report.peak_buffered = report.peak_buffered.max(cache.total_size());
            Ok(())
        })?;

        if !cache.is_empty() {
            debug!(
                objects = cache.len(),
                buffered = cache.total_size(),
                "final cache flush"
            );
        }
        self.flush(&mut cache, sink, &mut report)?;

        report.elapsed = start.elapsed();
        Ok(report)
    }

    /// Write the cache as one batch. An empty cache is not submitted.
    fn flush<M>(
        &self,
        cache: &mut BoundedCache,
        sink: &mut M,
        report: &mut GroupReport,
    ) -> RepackResult<()>
    where
        M: MappingSink + ?Sized,
    {
        if cache.is_empty() {
            return Ok(());
        }
        let bytes = cache.total_size();
        let (old, buffers) = cache.drain();
        let mut readers: Vec<&[u8]> = buffers.iter().map(Vec::as_slice).collect();
        let mut streams: Vec<&mut dyn Read> = readers
            .iter_mut()
            .map(|reader| reader as &mut dyn Read)
            .collect();
        let new = self
            .write(&mut streams, bytes, report)
            .map_err(RepackError::WriteFailure)?;
        sink.record(&old, &new)
    }

    /// Hand `streams` to the pack writer, counting the batch only if it
    /// succeeds.
    fn write(
        &self,
        streams: &mut [&mut dyn Read],
        bytes: u64,
        report: &mut GroupReport,
    ) -> StoreResult<Vec<NewHashkey>> {
        let start = Instant::now();
        let ids = self.writer.write_batch(streams, self.config.compress)?;
        report.write_time += start.elapsed();
        report.pack_writer_calls += 1;
        report.bytes_written += bytes;
        Ok(ids.into_iter().map(NewHashkey::new).collect())
    }
}
