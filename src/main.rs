//! Benchmark driver: builds one filter over a chosen workload and reports
//! build/query timings, space usage, and observed false-positive rates.

use std::hash::Hash;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use amq_filters::testdata::{
    CsvKeys, DataSource, RandomText, UniformInts, WordPhrases, Workload, ZipfMandelbrotInts,
    MAX_NUMBER, MIN_NUMBER,
};
use amq_filters::{
    BloomConfig, BloomFilter, BytesConverter, Converter, CuckooConfig, CuckooFilter, Filter,
    IntConverter, LinearHashable, RangeFilter, SuccinctRangeFilter, SuffixType, SurfConfig,
    VacuumConfig, VacuumFilter, XorConfig, XorFilter,
};

/// Roughly one in this many generated keys is inserted during range tests;
/// the rest only delimit query ranges.
const RANGE_INSERT_RATE: usize = 10;
const DRIVER_SEED: u64 = 228;

#[derive(Parser)]
#[command(
    name = "amq-filters",
    about = "Space/accuracy benchmark for approximate membership filters"
)]
struct Args {
    /// Filter to test: bloom | cuckoo | vacuum | xor | surf | surf_range
    filter: String,

    /// Workload: uniform | zipf | text | real | words | words_msp | all
    #[arg(default_value = "all")]
    test_data: String,

    /// Items inserted per test case
    #[arg(default_value_t = 1_000_000)]
    items: usize,

    /// Filter-specific parameters, in order:
    /// bloom: [buckets] [hashes]; cuckoo: [max_buckets] [bucket_size]
    /// [fingerprint_bits] [max_kicks]; vacuum: [fingerprint_bits]
    /// [max_kicks]; xor: [fingerprint_bits] [coefficient] [extra_slots];
    /// surf: [suffix_type] [suffix_bits] [fix_length] [cut_gain_threshold]
    #[arg(trailing_var_arg = true)]
    params: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    match args.filter.as_str() {
        "bloom" | "cuckoo" | "vacuum" | "xor" | "surf" => run_point_suite(&args),
        "surf_range" => run_range_suite(&args),
        other => bail!("unknown filter name {other:?}; use one of: bloom, cuckoo, vacuum, xor, surf, surf_range"),
    }
}

fn measure<R>(label: &str, body: impl FnOnce() -> R) -> R {
    let start = Instant::now();
    let result = body();
    println!("{label} time: {} ms", start.elapsed().as_millis());
    result
}

fn param<T: std::str::FromStr>(args: &Args, index: usize, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match args.params.get(index) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid filter parameter {raw:?}")),
        None => Ok(default),
    }
}

fn surf_config(args: &Args) -> anyhow::Result<SurfConfig> {
    let defaults = SurfConfig::default();
    let suffix_type = match param(args, 0, "hash".to_string())?.as_str() {
        "empty" | "base" => SuffixType::Empty,
        "real" => SuffixType::Real,
        _ => SuffixType::Hash,
    };
    Ok(SurfConfig {
        suffix_type,
        suffix_bits: param(args, 1, defaults.suffix_bits)?,
        fix_length: param(args, 2, defaults.fix_length)?,
        cut_gain_threshold: param(args, 3, defaults.cut_gain_threshold)?,
    })
}

/// Ties a key type to its default trie converter so the driver can build a
/// SuRF for either integers or strings from one code path.
trait DriverKey: LinearHashable + Eq + Hash + Clone + Send + Sync + 'static {
    type Conv: Converter<Self> + Default + Send + Sync;
}

impl DriverKey for i32 {
    type Conv = IntConverter;
}

impl DriverKey for String {
    type Conv = BytesConverter;
}

fn make_filter<T: DriverKey>(args: &Args) -> anyhow::Result<Box<dyn Filter<T> + Send + Sync>> {
    Ok(match args.filter.as_str() {
        "bloom" => {
            let defaults = BloomConfig::default();
            Box::new(BloomFilter::new(BloomConfig {
                bits: param(args, 0, defaults.bits)?,
                hash_count: param(args, 1, defaults.hash_count)?,
                ..defaults
            }))
        }
        "cuckoo" => {
            let defaults = CuckooConfig::default();
            Box::new(CuckooFilter::new(CuckooConfig {
                max_buckets: param(args, 0, defaults.max_buckets)?,
                bucket_size: param(args, 1, defaults.bucket_size)?,
                fingerprint_bits: param(args, 2, defaults.fingerprint_bits)?,
                max_kicks: param(args, 3, defaults.max_kicks)?,
                ..defaults
            })?)
        }
        "vacuum" => {
            let defaults = VacuumConfig::for_items(args.items);
            Box::new(VacuumFilter::new(VacuumConfig {
                fingerprint_bits: param(args, 0, defaults.fingerprint_bits)?,
                max_kicks: param(args, 1, defaults.max_kicks)?,
                ..defaults
            })?)
        }
        "xor" => {
            let defaults = XorConfig::default();
            Box::new(XorFilter::new(XorConfig {
                fingerprint_bits: param(args, 0, defaults.fingerprint_bits)?,
                size_coefficient: param(args, 1, defaults.size_coefficient)?,
                extra_slots: param(args, 2, defaults.extra_slots)?,
                ..defaults
            }))
        }
        "surf" => Box::new(SuccinctRangeFilter::with_converter(
            surf_config(args)?,
            T::Conv::default(),
        )),
        other => bail!("unknown filter name {other:?}"),
    })
}

fn run_point_suite(args: &Args) -> anyhow::Result<()> {
    let selected = |name: &str| args.test_data == name || args.test_data == "all";
    let mut matched = false;

    if selected("uniform") {
        matched = true;
        let workload = Workload::new(UniformInts::new(DRIVER_SEED, MIN_NUMBER, MAX_NUMBER));
        run_case(args, workload, "Uniform distribution for integers")?;
    }
    if selected("zipf") {
        matched = true;
        let workload = Workload::new(ZipfMandelbrotInts::new(DRIVER_SEED, 1.13, 2.73, 1_000_000));
        run_case(args, workload, "Zipf-Mandelbrot distribution for integers")?;
    }
    if selected("text") {
        matched = true;
        let workload = Workload::new(RandomText::new(DRIVER_SEED, 5, 100));
        run_case(args, workload, "Random strings")?;
    }
    if selected("real") {
        matched = true;
        let source = CsvKeys::from_file(DRIVER_SEED, "data/payments.csv")
            .context("loading data/payments.csv")?;
        run_case(args, Workload::new(source), "Csv data")?;
    }
    if selected("words") {
        matched = true;
        let source = WordPhrases::from_file(DRIVER_SEED, "data/words30k.txt", 1.13, 2.73, 0.0)
            .context("loading data/words30k.txt")?;
        run_case(args, Workload::new(source), "Words (no misspells)")?;
    }
    if selected("words_msp") {
        matched = true;
        let source = WordPhrases::from_file(DRIVER_SEED, "data/words30k.txt", 1.13, 2.73, 0.1)
            .context("loading data/words30k.txt")?;
        run_case(args, Workload::new(source), "Words (with misspells)")?;
    }
    if !matched {
        bail!(
            "unknown test data {:?}; use one of: uniform, zipf, text, real, words, words_msp, all",
            args.test_data
        );
    }
    Ok(())
}

fn run_case<T: DriverKey, G: DataSource<T>>(
    args: &Args,
    mut workload: Workload<T, G>,
    label: &str,
) -> anyhow::Result<()> {
    println!("TEST CASE: {label}\n");
    let mut filter = make_filter::<T>(args)?;

    let items: Vec<T> = (0..args.items).map(|_| workload.new_item()).collect();
    measure("Filter build", || filter.build(&items))?;
    eprintln!("Put {} items", args.items);

    if let Some(size) = filter.hash_table_size_bits() {
        println!("Hash tables size (in bits):  {size}");
        println!("Bits per item: {:.2}", size as f64 / args.items as f64);
    }
    if let Some(size) = filter.used_space_bits() {
        println!("Really used space (in bits): {size}");
    }

    let existing = workload.items();
    let found = measure("Checking existing items", || {
        existing.par_iter().filter(|item| filter.find(item)).count()
    });
    println!(
        "Existing items check (required 100%): found {found} of {} ({:.2}%)",
        existing.len(),
        100.0 * found as f64 / existing.len() as f64
    );

    let mut queries = Vec::with_capacity(args.items);
    while queries.len() < args.items {
        let query = workload.query();
        if !workload.contains(&query) {
            queries.push(query);
        }
    }
    let found = measure("Checking missing items", || {
        queries.par_iter().filter(|query| filter.find(query)).count()
    });
    println!(
        "Missing items check (perfect is 0%): found {found} of {} ({:.2}%)",
        queries.len(),
        100.0 * found as f64 / queries.len() as f64
    );
    println!("_______________________________________\n");
    Ok(())
}

fn run_range_suite(args: &Args) -> anyhow::Result<()> {
    let config = surf_config(args)?;
    let selected = |name: &str| args.test_data == name || args.test_data == "all";
    let mut matched = false;

    if selected("uniform") {
        matched = true;
        let source = UniformInts::new(DRIVER_SEED, MIN_NUMBER, MAX_NUMBER);
        run_range_case(args, config, source, "Uniform distribution for integers")?;
    }
    if selected("zipf") {
        matched = true;
        let source = ZipfMandelbrotInts::new(DRIVER_SEED, 1.13, 2.73, 1_000_000);
        run_range_case(args, config, source, "Zipf-Mandelbrot distribution for integers")?;
    }
    if selected("text") {
        matched = true;
        let source = RandomText::new(DRIVER_SEED, 5, 100);
        run_range_case(args, config, source, "Random strings")?;
    }
    if selected("real") {
        matched = true;
        let source = CsvKeys::from_file(DRIVER_SEED, "data/payments.csv")
            .context("loading data/payments.csv")?;
        run_range_case(args, config, source, "Csv data")?;
    }
    if selected("words") {
        matched = true;
        let source = WordPhrases::from_file(DRIVER_SEED, "data/words30k.txt", 1.13, 2.73, 0.0)
            .context("loading data/words30k.txt")?;
        run_range_case(args, config, source, "Words (no misspells)")?;
    }
    if selected("words_msp") {
        matched = true;
        let source = WordPhrases::from_file(DRIVER_SEED, "data/words30k.txt", 1.13, 2.73, 0.1)
            .context("loading data/words30k.txt")?;
        run_range_case(args, config, source, "Words (with misspells)")?;
    }
    if !matched {
        bail!(
            "unknown test data {:?}; use one of: uniform, zipf, text, real, words, words_msp, all",
            args.test_data
        );
    }
    Ok(())
}

fn run_range_case<T: DriverKey + Ord, G: DataSource<T>>(
    args: &Args,
    config: SurfConfig,
    mut source: G,
    label: &str,
) -> anyhow::Result<()> {
    println!("TEST CASE: {label}\n");
    let mut filter = SuccinctRangeFilter::with_converter(config, T::Conv::default());

    let mut keys: Vec<T> = (0..args.items * RANGE_INSERT_RATE)
        .map(|_| source.add_query())
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut rng = StdRng::seed_from_u64(15);
    let mut inserted = vec![false; keys.len()];
    let mut to_insert = Vec::new();
    for (key, flag) in keys.iter().zip(inserted.iter_mut()) {
        if rng.gen_range(0..RANGE_INSERT_RATE) == 0 {
            *flag = true;
            to_insert.push(key.clone());
        }
    }

    measure("Filter build", || filter.build(&to_insert))?;
    eprintln!("Put {} items", to_insert.len());
    if let Some(size) = filter.hash_table_size_bits() {
        eprintln!("Filter size (bits): {size}");
        println!("Bits per item: {:.2}", size as f64 / to_insert.len() as f64);
    }

    let mut in_ranges = Vec::with_capacity(args.items);
    let mut out_ranges = Vec::with_capacity(args.items);
    while in_ranges.len() < args.items || out_ranges.len() < args.items {
        let length = rng.gen_range(1..RANGE_INSERT_RATE * 2);
        if keys.len() <= length + 1 {
            bail!("not enough distinct keys for range queries");
        }
        let start = rng.gen_range(0..keys.len() - length - 1);
        let hit = inserted[start..=start + length].iter().any(|&b| b);
        if hit {
            if in_ranges.len() < args.items {
                in_ranges.push((keys[start].clone(), keys[start + length].clone()));
            }
        } else if out_ranges.len() < args.items {
            out_ranges.push((keys[start].clone(), keys[start + length].clone()));
        }
    }

    let found = measure("Checking existing ranges", || {
        in_ranges
            .par_iter()
            .filter(|(lo, hi)| filter.find_range(lo, hi))
            .count()
    });
    println!(
        "Existing ranges check (100% required): found {found} of {} ({:.2}%)",
        in_ranges.len(),
        100.0 * found as f64 / in_ranges.len() as f64
    );

    let found = measure("Checking missing ranges", || {
        out_ranges
            .par_iter()
            .filter(|(lo, hi)| filter.find_range(lo, hi))
            .count()
    });
    println!(
        "Missing ranges check (0% is perfect): found {found} of {} ({:.2}%)",
        out_ranges.len(),
        100.0 * found as f64 / out_ranges.len() as f64
    );
    println!("_______________________________________\n");
    Ok(())
}
