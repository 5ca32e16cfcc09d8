use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spiritpak::codec::{archive, packed, SECTOR_SIZE};
use spiritpak::container::{unpack, IdAllocator};
use spiritpak::directory::{DirectoryLayout, SectorDirectory};
use spiritpak::signature::classify;

fn packed_sample(blocks: usize) -> Vec<u8> {
    let children: Vec<Vec<u8>> = (0..blocks).map(|i| vec![(i % 251) as u8 + 1; 300 + i % 7]).collect();
    let mut data = packed::encode(&packed::PackedHeader::default(), &children).unwrap();
    data.extend_from_slice(&[0u8; 4]);
    data
}

fn bench_classify(c: &mut Criterion) {
    let noise: Vec<u8> = (0..64 * 1024u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect();
    let packed = packed_sample(200);

    c.bench_function("classify_64k_noise", |b| b.iter(|| classify(black_box(&noise), false)));
    c.bench_function("classify_packed_200", |b| b.iter(|| classify(black_box(&packed), false)));
}

fn bench_codecs(c: &mut Criterion) {
    let packed = packed_sample(200);
    c.bench_function("packed_decode_200", |b| b.iter(|| packed::decode(black_box(&packed)).unwrap()));

    let header = archive::ArchiveHeader { segments: 64, sectored: true, archive_length: true, ..Default::default() };
    let offsets: Vec<usize> = (0..64).map(|i| 2048 * (i + 1)).collect();
    let children: Vec<Vec<u8>> = (0..64).map(|i| vec![i as u8; 1500]).collect();
    c.bench_function("archive_encode_sectored_64", |b| {
        b.iter(|| archive::encode(black_box(&header), &offsets, &children).unwrap())
    });
}

fn bench_unpack(c: &mut Criterion) {
    let entry = packed_sample(200);
    let per_slot = entry.len().div_ceil(SECTOR_SIZE);
    let mut container = Vec::new();
    let mut pairs = Vec::new();
    for slot in 0..32 {
        container.extend_from_slice(&entry);
        container.resize((slot + 1) * per_slot * SECTOR_SIZE, 0);
        pairs.push(((slot * per_slot) as u32, entry.len() as u32));
    }
    let directory = SectorDirectory::from_pairs(pairs);
    let layout = DirectoryLayout::default();

    c.bench_function("unpack_32_packed_slots", |b| {
        b.iter(|| {
            let mut ids = IdAllocator::new();
            unpack(black_box(&container), &directory, &layout, &mut ids).unwrap()
        })
    });
}

criterion_group!(benches, bench_classify, bench_codecs, bench_unpack);
criterion_main!(benches);
