// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]

//! Benchmarks for Clay encoding, erasure decoding, and single-node repair.

use std::collections::{BTreeMap, BTreeSet};

use clay_core::{encoding::ClayCode, ChunkIndex, Profile};
use clay_test_utils::random_data;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

// Parameter sets from the regenerating-codes literature: (k, m, d).
const CONFIGS: [(usize, usize, usize); 2] = [(4, 2, 5), (6, 3, 8)];
const DATA_SIZES: [usize; 2] = [1 << 16, 1 << 20];

fn make_code(k: usize, m: usize, d: usize) -> ClayCode {
    let mut profile = Profile::new();
    profile.insert("k".to_string(), k.to_string());
    profile.insert("m".to_string(), m.to_string());
    profile.insert("d".to_string(), d.to_string());
    ClayCode::from_profile(&profile).expect("benchmark profiles are valid")
}

fn all_chunks(code: &ClayCode) -> BTreeSet<ChunkIndex> {
    (0..code.chunk_count()).map(|i| ChunkIndex(i as u16)).collect()
}

fn encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (k, m, d) in CONFIGS {
        for data_size in DATA_SIZES {
            let data = random_data(data_size);
            let mut code = make_code(k, m, d);
            let want = all_chunks(&code);
            group.throughput(Throughput::Bytes(data_size as u64));
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("k={k},m={m},d={d},size={data_size}")),
                &data,
                |b, data| {
                    b.iter(|| code.encode(&want, data).expect("encoding succeeds"));
                },
            );
        }
    }
    group.finish();
}

fn decode_with_erasures(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_with_erasures");
    for (k, m, d) in CONFIGS {
        for data_size in DATA_SIZES {
            let data = random_data(data_size);
            let mut code = make_code(k, m, d);
            let want = all_chunks(&code);
            let chunks = code.encode(&want, &data).expect("encoding succeeds");
            // Drop the maximum number of chunks the code tolerates.
            let available: BTreeMap<ChunkIndex, Vec<u8>> = chunks
                .into_iter()
                .filter(|(index, _)| index.as_usize() >= m)
                .collect();
            group.throughput(Throughput::Bytes(data_size as u64));
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("k={k},m={m},d={d},size={data_size}")),
                &available,
                |b, available| {
                    b.iter(|| code.decode_concat(available).expect("decoding succeeds"));
                },
            );
        }
    }
    group.finish();
}

fn repair_single_node(c: &mut Criterion) {
    let mut group = c.benchmark_group("repair_single_node");
    for (k, m, d) in CONFIGS {
        for data_size in DATA_SIZES {
            let data = random_data(data_size);
            let mut code = make_code(k, m, d);
            let chunks = code
                .encode(&all_chunks(&code), &data)
                .expect("encoding succeeds");
            let chunk_size = code.chunk_size(data_size);
            let sub_chunk_size = chunk_size / code.sub_chunk_count();

            let lost = ChunkIndex(1);
            let want = BTreeSet::from([lost]);
            let available: BTreeSet<ChunkIndex> = all_chunks(&code)
                .into_iter()
                .filter(|&chunk| chunk != lost)
                .collect();
            let minimum = code
                .minimum_to_decode(&want, &available)
                .expect("repair is possible");
            let helper_data: BTreeMap<ChunkIndex, Vec<u8>> = minimum
                .iter()
                .map(|(&helper, ranges)| {
                    let chunk = &chunks[&helper];
                    let packed = ranges
                        .iter()
                        .flat_map(|&(offset, count)| {
                            chunk[offset * sub_chunk_size..(offset + count) * sub_chunk_size]
                                .iter()
                                .copied()
                        })
                        .collect();
                    (helper, packed)
                })
                .collect();

            group.throughput(Throughput::Bytes((d * chunk_size / (d - k + 1)) as u64));
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("k={k},m={m},d={d},size={data_size}")),
                &helper_data,
                |b, helper_data| {
                    b.iter(|| {
                        code.decode(&want, helper_data, chunk_size)
                            .expect("repair succeeds")
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, encode, decode_with_erasures, repair_single_node);
criterion_main!(benches);
