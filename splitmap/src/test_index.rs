#![cfg(test)]
#![allow(missing_docs)] // test only
use std::collections::BTreeMap;

use rand::prelude::*;

use crate::{empty_page, join_key, split_key, Key, SparseBitIndex, CHUNK_COUNT, CHUNK_SIZE};

// a few chunks only, so that operations keep hitting the same pages
const CHUNKS: [usize; 6] = [0, 1, 5, 511, 512, CHUNK_COUNT - 1];

/// Reference model tracking presence bits and store slots separately, as the index does.
struct CheckedIndex {
    dut: SparseBitIndex<u32>,
    ref_presence: BTreeMap<usize, u64>,
    ref_slots: BTreeMap<Key, u32>,
}

impl CheckedIndex {
    fn new() -> Self {
        CheckedIndex {
            dut: SparseBitIndex::new(),
            ref_presence: BTreeMap::new(),
            ref_slots: BTreeMap::new(),
        }
    }

    fn ref_present(&self, key: Key) -> bool {
        let (chunk, bit) = split_key(key);
        self.ref_presence.get(&chunk).is_some_and(|word| word & (1 << bit) != 0)
    }

    fn ref_get(&self, key: Key) -> Option<u32> {
        self.ref_slots.get(&key).copied().filter(|_| self.ref_present(key))
    }

    fn insert(&mut self, key: Key, value: u32) -> Option<u32> {
        let ref_result = self.ref_get(key);
        let (chunk, bit) = split_key(key);
        *self.ref_presence.entry(chunk).or_default() |= 1 << bit;
        self.ref_slots.insert(key, value);
        let dut_result = self.dut.insert(key, value);
        assert_eq!(ref_result, dut_result);
        dut_result
    }

    fn get(&self, key: Key) -> Option<u32> {
        let dut_result = self.dut.get(key).copied();
        assert_eq!(self.ref_get(key), dut_result);
        assert_eq!(self.dut.get(key).copied(), dut_result);
        assert_eq!(self.dut.contains(key), self.ref_present(key));
        dut_result
    }

    fn write_word(&mut self, chunk: usize, word: u64) {
        self.ref_presence.insert(chunk, word);
        self.dut.write_chunk(chunk, word, None).unwrap();
    }

    fn transfer_page(&mut self, chunk: usize, word: u64, values: [Option<u32>; CHUNK_SIZE]) {
        self.ref_presence.insert(chunk, word);
        if word != 0 {
            for (bit, value) in values.iter().enumerate() {
                let key = join_key(chunk, bit);
                match value {
                    Some(value) => self.ref_slots.insert(key, *value),
                    None => self.ref_slots.remove(&key),
                };
            }
        }
        let mut page = empty_page();
        *page = values;
        self.dut.write_chunk(chunk, word, Some(page)).unwrap();
    }

    fn read_page(&self, chunk: usize) {
        let mut first = [None; CHUNK_SIZE];
        let mut second = [Some(0); CHUNK_SIZE];
        let allocated = self.dut.read_page(chunk, &mut first).unwrap();
        assert_eq!(self.dut.read_page(chunk, &mut second).unwrap(), allocated);
        assert_eq!(first, second);
        for (bit, value) in first.iter().enumerate() {
            assert_eq!(*value, self.ref_slots.get(&join_key(chunk, bit)).copied());
        }
    }

    fn check(&self) {
        let ref_entries: Vec<(Key, u32)> = self
            .ref_slots
            .keys()
            .filter_map(|&key| Some((key, self.ref_get(key)?)))
            .collect();
        let dut_entries: Vec<(Key, u32)> =
            self.dut.iter().map(|(key, &value)| (key, value)).collect();
        assert_eq!(ref_entries, dut_entries);

        let ref_len: usize = self
            .ref_presence
            .values()
            .map(|word| word.count_ones() as usize)
            .sum();
        assert_eq!(self.dut.len(), ref_len);
        for chunk in 0..CHUNK_COUNT {
            let ref_word = self.ref_presence.get(&chunk).copied().unwrap_or(0);
            assert_eq!(self.dut.presence_word(chunk), Ok(ref_word));
        }
    }

    fn check_coherence(&self) {
        for &chunk in &CHUNKS {
            for bit in 0..CHUNK_SIZE {
                let key = join_key(chunk, bit);
                assert_eq!(self.dut.get(key).is_some(), self.dut.contains(key));
            }
        }
    }
}

fn random_key(rng: &mut impl Rng) -> Key {
    let chunk = *CHUNKS.choose(rng).unwrap();
    join_key(chunk, rng.gen_range(0..CHUNK_SIZE))
}

fn random_page(rng: &mut impl Rng) -> [Option<u32>; CHUNK_SIZE] {
    std::array::from_fn(|_| rng.gen_bool(0.5).then(|| rng.gen()))
}

#[test]
fn random_operations_match_reference() {
    let mut rng = rand_pcg::Pcg64::seed_from_u64(25);
    let mut index = CheckedIndex::new();
    for round in 0..4000 {
        match rng.gen_range(0..10) {
            0..=3 => {
                let key = random_key(&mut rng);
                index.insert(key, rng.gen());
            }
            4..=6 => {
                index.get(random_key(&mut rng));
            }
            7 => {
                // Clears bits only, the way pruning does.
                let chunk = *CHUNKS.choose(&mut rng).unwrap();
                let word = index.dut.presence_word(chunk).unwrap() & rng.gen::<u64>();
                index.write_word(chunk, word);
            }
            8 => {
                // Sets arbitrary bits, possibly without a value behind them.
                let chunk = *CHUNKS.choose(&mut rng).unwrap();
                let word = rng.gen::<u64>() & rng.gen::<u64>();
                index.write_word(chunk, word);
            }
            _ => {
                let chunk = *CHUNKS.choose(&mut rng).unwrap();
                let word = if rng.gen_bool(0.2) { 0 } else { rng.gen() };
                let page = random_page(&mut rng);
                index.transfer_page(chunk, word, page);
            }
        }
        index.read_page(*CHUNKS.choose(&mut rng).unwrap());
        if round % 100 == 0 {
            index.check();
        }
    }
    index.check();
}

#[test]
fn presence_and_values_stay_coherent() {
    let mut rng = rand_pcg::Pcg64::seed_from_u64(17);
    let mut index = CheckedIndex::new();
    for _ in 0..4000 {
        match rng.gen_range(0..4) {
            0 | 1 => {
                let key = random_key(&mut rng);
                index.insert(key, rng.gen());
            }
            2 => {
                index.get(random_key(&mut rng));
            }
            _ => {
                let chunk = *CHUNKS.choose(&mut rng).unwrap();
                let word = index.dut.presence_word(chunk).unwrap() & rng.gen::<u64>();
                index.write_word(chunk, word);
            }
        }
    }
    index.check();
    index.check_coherence();
}
