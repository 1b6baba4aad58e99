use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::ops::AddAssign;
use std::sync::mpsc;
use std::thread;
use crate::flow::key::FlowKey;
use crate::flow::record::PacketRecord;

/// Records buffered per worker before the reader blocks.
const PARTITION_QUEUE_DEPTH: usize = 4096;

/// Running counters for one flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowMetrics {
    pub packets: u64,
    pub bytes: u64,
    pub upstream_packets: u64,
    pub upstream_bytes: u64,
    pub downstream_packets: u64,
    pub downstream_bytes: u64,
}

impl FlowMetrics {
    fn record(&mut self, length: u64, upstream: bool) {
        self.packets += 1;
        self.bytes += length;

        if upstream {
            self.upstream_packets += 1;
            self.upstream_bytes += length;
        } else {
            self.downstream_packets += 1;
            self.downstream_bytes += length;
        }

        debug_assert!(self.is_consistent());
    }

    /// Directional counters add up to the totals.
    pub fn is_consistent(&self) -> bool {
        self.upstream_bytes + self.downstream_bytes == self.bytes
            && self.upstream_packets + self.downstream_packets == self.packets
    }

    /// The same counters seen from the peer endpoint.
    pub fn reversed(&self) -> Self {
        FlowMetrics {
            upstream_packets: self.downstream_packets,
            upstream_bytes: self.downstream_bytes,
            downstream_packets: self.upstream_packets,
            downstream_bytes: self.upstream_bytes,
            ..*self
        }
    }
}

impl AddAssign for FlowMetrics {
    fn add_assign(&mut self, other: Self) {
        self.packets += other.packets;
        self.bytes += other.bytes;
        self.upstream_packets += other.upstream_packets;
        self.upstream_bytes += other.upstream_bytes;
        self.downstream_packets += other.downstream_packets;
        self.downstream_bytes += other.downstream_bytes;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowSummary {
    pub key: FlowKey,
    pub metrics: FlowMetrics,
}

/// Builds the flow table for a single capture.
///
/// Entries are created on the first packet of a flow and never removed; the
/// table lives as long as the aggregator.
#[derive(Debug, Clone, Default)]
pub struct FlowAggregator {
    flows: BTreeMap<FlowKey, FlowMetrics>,
}

impl FlowAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, packet: &PacketRecord) {
        let key = FlowKey::from_record(packet);
        let metrics = self.flows.entry(key).or_insert_with(|| {
            log::trace!("new flow {}", key);
            FlowMetrics::default()
        });

        metrics.record(packet.length, key.is_upstream(&packet.source()));
    }

    pub fn observe_all<I>(&mut self, packets: I)
    where
        I: IntoIterator<Item = PacketRecord>,
    {
        for packet in packets {
            self.observe(&packet);
        }
    }

    /// One summary per flow, in key order. Does not touch the table.
    pub fn summarize(&self) -> Vec<FlowSummary> {
        self.flows
            .iter()
            .map(|(key, metrics)| FlowSummary { key: *key, metrics: *metrics })
            .collect()
    }

    /// Folds a partial table built over a disjoint slice of the same capture.
    pub fn merge(&mut self, other: FlowAggregator) {
        for (key, metrics) in other.flows {
            *self.flows.entry(key).or_default() += metrics;
        }
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowMetrics> {
        self.flows.get(key)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Counters summed over every flow.
    pub fn totals(&self) -> FlowMetrics {
        let mut totals = FlowMetrics::default();
        for metrics in self.flows.values() {
            totals += *metrics;
        }
        totals
    }
}

impl FromIterator<PacketRecord> for FlowAggregator {
    fn from_iter<I: IntoIterator<Item = PacketRecord>>(packets: I) -> Self {
        let mut aggregator = FlowAggregator::new();
        aggregator.observe_all(packets);
        aggregator
    }
}

fn partition_of(key: &FlowKey, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

/// Worker count actually used for a requested `partitions`: never more than
/// the host's available parallelism, never less than one.
pub fn effective_partitions(partitions: usize) -> usize {
    let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let effective = partitions.clamp(1, available);
    if effective != partitions {
        log::warn!(
            "{} partitions requested, using {} (available parallelism {})",
            partitions,
            effective,
            available
        );
    }
    effective
}

/// Aggregates `packets` on up to `partitions` worker threads.
///
/// Packets are routed by flow key, so every flow is owned by exactly one
/// worker. The partial tables are merged on the calling thread once the
/// input is exhausted. The result matches sequential aggregation.
pub fn aggregate_partitioned<I>(packets: I, partitions: usize) -> FlowAggregator
where
    I: IntoIterator<Item = PacketRecord>,
{
    let partitions = effective_partitions(partitions);
    if partitions <= 1 {
        return packets.into_iter().collect();
    }

    thread::scope(|scope| {
        let mut senders = Vec::with_capacity(partitions);
        let mut workers = Vec::with_capacity(partitions);

        for _ in 0..partitions {
            let (tx, rx) = mpsc::sync_channel::<PacketRecord>(PARTITION_QUEUE_DEPTH);
            senders.push(tx);
            workers.push(scope.spawn(move || rx.into_iter().collect::<FlowAggregator>()));
        }

        for packet in packets {
            let shard = partition_of(&FlowKey::from_record(&packet), partitions);
            // A closed channel means the worker panicked; join reports it below.
            if senders[shard].send(packet).is_err() {
                break;
            }
        }
        drop(senders);

        let mut merged = FlowAggregator::new();
        for worker in workers {
            match worker.join() {
                Ok(partial) => merged.merge(partial),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        log::debug!("merged {} partitions into {} flows", partitions, merged.len());
        merged
    })
}
