// Copyright 2019-2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte level mutations of serialized requests.
//!
//! Unlike the structured tests, mutations may break the CBOR encoding itself. The sequence of
//! mutations only depends on the seed, so a failing run can be repeated.

use alloc::vec::Vec;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOperation {
    EraseByte,
    InsertByte,
    ShuffleBytes,
}

impl MutationOperation {
    pub const ALL: [MutationOperation; 3] = [
        MutationOperation::EraseByte,
        MutationOperation::InsertByte,
        MutationOperation::ShuffleBytes,
    ];
}

pub struct Mutator {
    rng: StdRng,
    max_mutation_degree: usize,
}

impl Mutator {
    /// Each call to [`mutate`](Mutator::mutate) applies between 1 and `max_mutation_degree`
    /// operations.
    pub fn new(max_mutation_degree: usize, seed: u64) -> Self {
        Mutator {
            rng: StdRng::seed_from_u64(seed),
            max_mutation_degree: max_mutation_degree.max(1),
        }
    }

    /// Removes one byte. Never empties the data.
    pub fn erase_byte(&mut self, data: &mut Vec<u8>) -> bool {
        if data.len() <= 1 {
            return false;
        }
        let index = self.rng.gen_range(0..data.len());
        data.remove(index);
        true
    }

    /// Inserts one random byte, if the result fits into `max_size`.
    pub fn insert_byte(&mut self, data: &mut Vec<u8>, max_size: usize) -> bool {
        if data.len() >= max_size {
            return false;
        }
        let index = self.rng.gen_range(0..=data.len());
        let byte = self.rng.gen::<u8>();
        data.insert(index, byte);
        true
    }

    /// Permutes a random window of at least two bytes.
    pub fn shuffle_bytes(&mut self, data: &mut Vec<u8>, max_size: usize) -> bool {
        if data.len() > max_size || data.len() <= 1 {
            return false;
        }
        let count = self.rng.gen_range(2..=data.len());
        let offset = self.rng.gen_range(0..=data.len() - count);
        data[offset..offset + count].shuffle(&mut self.rng);
        true
    }

    fn apply(&mut self, operation: MutationOperation, data: &mut Vec<u8>, max_size: usize) -> bool {
        match operation {
            MutationOperation::EraseByte => self.erase_byte(data),
            MutationOperation::InsertByte => self.insert_byte(data, max_size),
            MutationOperation::ShuffleBytes => self.shuffle_bytes(data, max_size),
        }
    }

    /// Applies a random number of random operations, and returns how many were applied.
    ///
    /// A failed operation is replaced by another one. Stops early if no operation applies.
    pub fn mutate(&mut self, data: &mut Vec<u8>, max_size: usize) -> usize {
        let degree = self.rng.gen_range(1..=self.max_mutation_degree);
        let mut applied = 0;
        while applied < degree {
            let mut operations = MutationOperation::ALL;
            operations.shuffle(&mut self.rng);
            match operations
                .iter()
                .find(|operation| self.apply(**operation, data, max_size))
            {
                Some(_) => applied += 1,
                None => break,
            }
        }
        applied
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_erase_byte() {
        let mut mutator = Mutator::new(1, 0);
        let mut data = vec![0x01, 0x02, 0x03];
        assert!(mutator.erase_byte(&mut data));
        assert_eq!(data.len(), 2);
        assert!(mutator.erase_byte(&mut data));
        assert!(!mutator.erase_byte(&mut data));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_insert_byte_respects_max_size() {
        let mut mutator = Mutator::new(1, 0);
        let mut data = Vec::new();
        assert!(mutator.insert_byte(&mut data, 2));
        assert!(mutator.insert_byte(&mut data, 2));
        assert!(!mutator.insert_byte(&mut data, 2));
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_shuffle_bytes_keeps_content() {
        let mut mutator = Mutator::new(1, 0);
        let original: Vec<u8> = (0..32).collect();
        let mut data = original.clone();
        assert!(mutator.shuffle_bytes(&mut data, 64));
        let mut sorted = data.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, original);
        assert!(!mutator.shuffle_bytes(&mut data, 16));
        assert!(!mutator.shuffle_bytes(&mut vec![0x01], 16));
    }

    #[test]
    fn test_mutate_is_seeded() {
        let original: Vec<u8> = (0..64).collect();
        let mut first = Mutator::new(8, 42);
        let mut second = Mutator::new(8, 42);
        for _ in 0..20 {
            let mut first_data = original.clone();
            let mut second_data = original.clone();
            let applied = first.mutate(&mut first_data, 128);
            assert_eq!(second.mutate(&mut second_data, 128), applied);
            assert!((1..=8).contains(&applied));
            assert_eq!(first_data, second_data);
            assert!(first_data.len() <= 128);
        }
    }

    #[test]
    fn test_mutate_stops_without_applicable_operation() {
        let mut mutator = Mutator::new(4, 0);
        let mut data = vec![0x01];
        assert_eq!(mutator.mutate(&mut data, 0), 0);
        assert_eq!(data, vec![0x01]);
    }
}
