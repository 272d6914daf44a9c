use cmf_chunks::{chunk_data, chunk_ids, hash_object, ChunkSizes};
use cmf_core::{HashAlgo, ObjectKind};

fn make_data(size: usize) -> Vec<u8> {
    // Semi-realistic data: repeating pattern with some entropy
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576, 10485760])]
fn fastcdc_chunk(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| chunk_data(divan::black_box(&data), ChunkSizes::SMALL));
}

#[divan::bench(args = [HashAlgo::Blake3, HashAlgo::Sha256])]
fn object_hash_1mb(bencher: divan::Bencher, algo: HashAlgo) {
    let data = make_data(1024 * 1024);
    bencher
        .counter(divan::counter::BytesCount::new(data.len()))
        .bench(|| hash_object(algo, ObjectKind::Blob, divan::black_box(&data)));
}

#[divan::bench(args = [1048576, 10485760])]
fn chunk_and_hash(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let chunks = chunk_data(divan::black_box(&data), ChunkSizes::SMALL);
            chunk_ids(HashAlgo::Blake3, &data, &chunks)
        });
}

fn main() {
    divan::main();
}
