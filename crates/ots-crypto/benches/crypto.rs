use ots_core::CipherKind;
use ots_crypto::{decrypt, encrypt, generate_key, generate_nonce, OsEntropy};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [64, 4096, 65536])]
fn bench_encrypt_chacha(bencher: divan::Bencher, size: usize) {
    bench_encrypt(bencher, size, CipherKind::ChaCha20Poly1305);
}

#[divan::bench(args = [64, 4096, 65536])]
fn bench_encrypt_aes(bencher: divan::Bencher, size: usize) {
    bench_encrypt(bencher, size, CipherKind::Aes256Gcm);
}

#[divan::bench(args = [64, 4096, 65536])]
fn bench_decrypt_chacha(bencher: divan::Bencher, size: usize) {
    let key = generate_key(&OsEntropy).unwrap();
    let nonce = generate_nonce(&OsEntropy, CipherKind::ChaCha20Poly1305).unwrap();
    let data = make_data(size);
    let (ct, tag) = encrypt(&key, &nonce, &data, CipherKind::ChaCha20Poly1305, b"").unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt(
                divan::black_box(&key),
                &nonce,
                divan::black_box(&ct),
                &tag,
                CipherKind::ChaCha20Poly1305,
                b"",
            )
            .unwrap()
        });
}

fn bench_encrypt(bencher: divan::Bencher, size: usize, cipher: CipherKind) {
    let key = generate_key(&OsEntropy).unwrap();
    let nonce = generate_nonce(&OsEntropy, cipher).unwrap();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            encrypt(
                divan::black_box(&key),
                &nonce,
                divan::black_box(&data),
                cipher,
                b"",
            )
            .unwrap()
        });
}

fn main() {
    divan::main();
}
