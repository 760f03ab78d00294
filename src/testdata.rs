//! Workload generators for the benchmark driver.
//!
//! Each source produces items to insert and search queries drawn from the
//! same distribution; [`Workload`] remembers what was inserted so negative
//! queries can be made provably disjoint.

use std::collections::HashSet;
use std::fs::File;
use std::hash::Hash;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::weighted_alias::WeightedAliasIndex;

/// Lower bound of the integer workloads.
pub const MIN_NUMBER: i32 = -2_000_000_000;
/// Upper bound of the integer workloads.
pub const MAX_NUMBER: i32 = 2_000_000_000;

/// A stream of items to insert and queries to run against them.
pub trait DataSource<T> {
    /// Next item to insert into a filter.
    fn add_query(&mut self) -> T;
    /// Next membership query.
    fn search_query(&mut self) -> T;
}

/// Uniform integers over a closed range.
pub struct UniformInts {
    rng: StdRng,
    low: i32,
    high: i32,
}

impl UniformInts {
    pub fn new(seed: u64, low: i32, high: i32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            low,
            high,
        }
    }
}

impl DataSource<i32> for UniformInts {
    fn add_query(&mut self) -> i32 {
        self.rng.gen_range(self.low..=self.high)
    }

    fn search_query(&mut self) -> i32 {
        self.rng.gen_range(self.low..=self.high)
    }
}

/// Uniform inserts with Zipf–Mandelbrot-distributed queries: a skewed read
/// pattern against an unskewed key population.
pub struct ZipfMandelbrotInts {
    rng: StdRng,
    uniform_high: i32,
    zipf: WeightedAliasIndex<f64>,
}

impl ZipfMandelbrotInts {
    /// Weight of rank `k` is `1 / (k + q)^s` for `k` in `1..=max`.
    pub fn new(seed: u64, s: f64, q: f64, max: usize) -> Self {
        let max = max.max(1);
        let weights: Vec<f64> = (1..=max).map(|k| 1.0 / (k as f64 + q).powf(s)).collect();
        let zipf = WeightedAliasIndex::new(weights).expect("zipf weights are positive and finite");
        Self {
            rng: StdRng::seed_from_u64(seed),
            uniform_high: ((max as i64) * 10).min(MAX_NUMBER as i64) as i32,
            zipf,
        }
    }

    fn zipf_rank(&mut self) -> usize {
        self.zipf.sample(&mut self.rng) + 1
    }
}

impl DataSource<i32> for ZipfMandelbrotInts {
    fn add_query(&mut self) -> i32 {
        self.rng.gen_range(0..=self.uniform_high)
    }

    fn search_query(&mut self) -> i32 {
        self.zipf_rank() as i32
    }
}

/// Random lowercase strings of bounded length.
pub struct RandomText {
    rng: StdRng,
    min_len: usize,
    max_len: usize,
}

impl RandomText {
    pub fn new(seed: u64, min_len: usize, max_len: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            min_len,
            max_len,
        }
    }

    fn random_string(&mut self) -> String {
        let len = self.rng.gen_range(self.min_len..=self.max_len);
        (0..len)
            .map(|_| (b'a' + self.rng.gen_range(0..26u8)) as char)
            .collect()
    }
}

impl DataSource<String> for RandomText {
    fn add_query(&mut self) -> String {
        self.random_string()
    }

    fn search_query(&mut self) -> String {
        self.random_string()
    }
}

/// Phrases of one to five dictionary words picked by a Zipf–Mandelbrot
/// distribution, with an optional per-word misspell chance.
pub struct WordPhrases {
    rng: StdRng,
    words: Vec<String>,
    zipf: WeightedAliasIndex<f64>,
    misspell_chance: f64,
}

impl WordPhrases {
    pub fn from_file(
        seed: u64,
        path: impl AsRef<Path>,
        s: f64,
        q: f64,
        misspell_chance: f64,
    ) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let words: Vec<String> = reader
            .lines()
            .collect::<io::Result<Vec<_>>>()?
            .into_iter()
            .filter(|line| !line.is_empty())
            .collect();
        if words.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "word list is empty",
            ));
        }
        let weights: Vec<f64> = (1..=words.len().max(2))
            .map(|k| 1.0 / (k as f64 + q).powf(s))
            .collect();
        let zipf = WeightedAliasIndex::new(weights).expect("zipf weights are positive and finite");
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            words,
            zipf,
            misspell_chance,
        })
    }

    fn phrase(&mut self) -> String {
        let count = self.rng.gen_range(1..=5usize);
        let mut result = String::new();
        for i in 0..count {
            if i > 0 {
                result.push(' ');
            }
            let rank = self.zipf.sample(&mut self.rng).min(self.words.len() - 1);
            let mut word = self.words[rank].clone();
            if self.misspell_chance > 0.0 && self.rng.gen_bool(self.misspell_chance) {
                let pos = self.rng.gen_range(0..word.len());
                let letter = (b'a' + self.rng.gen_range(0..26u8)) as char;
                word.replace_range(pos..=pos, &letter.to_string());
            }
            result.push_str(&word);
        }
        result
    }
}

impl DataSource<String> for WordPhrases {
    fn add_query(&mut self) -> String {
        self.phrase()
    }

    fn search_query(&mut self) -> String {
        self.phrase()
    }
}

/// Keys parsed out of a payments CSV: the fourth column is the key; rows
/// whose third column is below 10000 are inserted, the rest only queried.
pub struct CsvKeys {
    rng: StdRng,
    insert_keys: Vec<String>,
    skip_keys: Vec<String>,
    cursor: usize,
}

impl CsvKeys {
    pub fn from_file(seed: u64, path: impl AsRef<Path>) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut insert_keys = Vec::new();
        let mut skip_keys = Vec::new();
        for line in reader.lines().skip(1) {
            let line = line?;
            let mut key = None;
            let mut insert = false;
            for (column, part) in line.split(',').enumerate() {
                if column == 2 {
                    insert = part.parse::<f64>().map(|v| v < 10_000.0).unwrap_or(false);
                }
                if column == 3 {
                    key = Some(part.to_string());
                }
            }
            match (key, insert) {
                (Some(key), true) => insert_keys.push(key),
                (Some(key), false) => skip_keys.push(key),
                (None, _) => {}
            }
        }
        if insert_keys.is_empty() || skip_keys.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "csv must yield both insert and skip keys",
            ));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            insert_keys,
            skip_keys,
            cursor: 0,
        })
    }
}

impl DataSource<String> for CsvKeys {
    fn add_query(&mut self) -> String {
        self.cursor = (self.cursor + 1) % self.insert_keys.len();
        self.insert_keys[self.cursor].clone()
    }

    fn search_query(&mut self) -> String {
        let index = self.rng.gen_range(0..self.skip_keys.len());
        self.skip_keys[index].clone()
    }
}

/// A data source plus the record of everything it has handed out for
/// insertion.
pub struct Workload<T, G> {
    source: G,
    items: HashSet<T>,
}

impl<T, G> Workload<T, G>
where
    T: Eq + Hash + Clone,
    G: DataSource<T>,
{
    pub fn new(source: G) -> Self {
        Self {
            source,
            items: HashSet::new(),
        }
    }

    /// Draws an item, records it, and returns it for insertion.
    pub fn new_item(&mut self) -> T {
        let item = self.source.add_query();
        self.items.insert(item.clone());
        item
    }

    /// Draws a search query without recording it.
    pub fn query(&mut self) -> T {
        self.source.search_query()
    }

    /// True when `item` was handed out by [`Workload::new_item`].
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Everything inserted so far.
    pub fn items(&self) -> &HashSet<T> {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn uniform_is_reproducible_per_seed() {
        let mut a = UniformInts::new(228, MIN_NUMBER, MAX_NUMBER);
        let mut b = UniformInts::new(228, MIN_NUMBER, MAX_NUMBER);
        for _ in 0..100 {
            assert_eq!(a.add_query(), b.add_query());
        }
    }

    #[test]
    fn zipf_queries_are_skewed_to_low_ranks() {
        let mut source = ZipfMandelbrotInts::new(1, 1.13, 2.73, 100_000);
        let mut low = 0usize;
        for _ in 0..10_000 {
            if source.search_query() <= 100 {
                low += 1;
            }
        }
        // The head of the distribution must dominate.
        assert!(low > 3_000, "only {low} of 10000 queries hit the head");
    }

    #[test]
    fn random_text_respects_length_bounds() {
        let mut source = RandomText::new(322, 1, 15);
        for _ in 0..1_000 {
            let s = source.add_query();
            assert!((1..=15).contains(&s.len()));
            assert!(s.bytes().all(|b| b.is_ascii_lowercase()));
        }
    }

    #[test]
    fn word_phrases_come_from_the_dictionary() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for word in ["alpha", "beta", "gamma", "delta"] {
            writeln!(file, "{word}").unwrap();
        }
        let mut source = WordPhrases::from_file(7, file.path(), 1.13, 2.73, 0.0).unwrap();
        for _ in 0..100 {
            let phrase = source.add_query();
            for word in phrase.split(' ') {
                assert!(["alpha", "beta", "gamma", "delta"].contains(&word), "{word}");
            }
        }
    }

    #[test]
    fn csv_split_by_payment_threshold() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,date,amount,account").unwrap();
        writeln!(file, "1,2020-01-01,500.0,small-a").unwrap();
        writeln!(file, "2,2020-01-02,20000.0,big-b").unwrap();
        writeln!(file, "3,2020-01-03,9999.9,small-c").unwrap();
        let mut source = CsvKeys::from_file(9, file.path()).unwrap();

        assert_eq!(source.insert_keys, vec!["small-a", "small-c"]);
        assert_eq!(source.skip_keys, vec!["big-b"]);
        assert_eq!(source.search_query(), "big-b");
        let item = source.add_query();
        assert!(item.starts_with("small-"));
    }

    #[test]
    fn workload_tracks_inserted_items() {
        let mut workload = Workload::new(UniformInts::new(11, 0, 1_000));
        let items: Vec<i32> = (0..50).map(|_| workload.new_item()).collect();
        for item in &items {
            assert!(workload.contains(item));
        }
        assert_eq!(workload.items().len(), items.iter().collect::<HashSet<_>>().len());
    }
}
