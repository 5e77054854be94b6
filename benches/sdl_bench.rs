use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use moula_server::sdl::{GuessLimits, SdlBlob};

const AVATAR: &str = "018006f09e899e8b9e8d07000110002100040001000500000004f0b29e939a01000000393000000000060001020005f09d8d9e96910001000000010000060300020000f0000102020000f0000500000005020000f0000000c03f0101020006f08c8b9e989a8c00020000000602020000f008020000f00003000000000100000601020000f0000700000000";

fn city() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x80, 0x04, 0xF0, 0x9C, 0x96, 0x8B, 0x86, 0x2B, 0x00, 0x00, 0x00, 0x06, 151];
    for _ in 0..151 {
        bytes.extend_from_slice(&[0x02, 0x00, 0x00, 0xF0, 0x08]);
    }
    bytes.push(0);
    bytes
}

fn bench_sdl_guess(c: &mut Criterion) {
    let mut group = c.benchmark_group("sdl_guess");
    let city = city();
    let avatar = hex::decode(AVATAR).unwrap();
    let limits = GuessLimits::default();

    group.bench_function("decode_city", |b| {
        b.iter(|| SdlBlob::from_bytes_with(&city, &limits).unwrap())
    });

    group.bench_function("decode_avatar", |b| {
        b.iter(|| SdlBlob::from_bytes_with(&avatar, &limits).unwrap())
    });

    let blob = SdlBlob::from_bytes(&avatar).unwrap();
    group.bench_function("encode_avatar", |b| b.iter(|| blob.to_bytes().unwrap()));

    group.bench_function("clone_avatar", |b| {
        b.iter_batched(|| blob.clone(), |copy| copy.record.nested_vars.len(), BatchSize::SmallInput)
    });

    group.finish();
}

criterion_group!(benches, bench_sdl_guess);
criterion_main!(benches);
