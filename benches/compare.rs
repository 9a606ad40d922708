use bisync_lib::core::DirectoryComparator;
use criterion::{criterion_group, criterion_main, Criterion};
use std::fs;
use std::path::Path;

const FILES: usize = 200;

fn populate(a: &Path, b: &Path) {
    for i in 0..FILES {
        let name = format!("file_{i:04}.txt");
        let body = format!("content {i}\n").repeat(32);
        fs::write(a.join(&name), &body).unwrap();
        match i % 4 {
            0 => {}
            1 => fs::write(b.join(&name), body.to_uppercase()).unwrap(),
            _ => fs::write(b.join(&name), &body).unwrap(),
        }
    }
    for i in 0..FILES / 10 {
        fs::create_dir_all(a.join(format!("dir_{i:03}"))).unwrap();
        fs::create_dir_all(b.join(format!("dir_{i:03}"))).unwrap();
    }
}

fn bench_compare(c: &mut Criterion) {
    let temp = tempfile::tempdir().unwrap();
    let a = temp.path().join("a");
    let b = temp.path().join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    populate(&a, &b);

    let comparator = DirectoryComparator::new();
    c.bench_function("compare_200_files", |bench| {
        bench.iter(|| comparator.compare(&a, &b).unwrap())
    });
}

criterion_group!(benches, bench_compare);
criterion_main!(benches);
