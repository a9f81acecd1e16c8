use std::cmp::min;
use std::ops::Index;

use crate::utils::MyHash;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    next: usize,
    occupied: bool,
}

impl<T> Default for Entry<T>
where
    T: Default,
{
    fn default() -> Self {
        Self {
            value: T::default(),
            next: 0,
            occupied: false,
        }
    }
}

/// Error returned when the table has no free cells left.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TableFull;

/// Hash-consing table: each distinct value is stored exactly once.
///
/// Cell 0 is a sentry and is never handed out, so index 0 doubles as "no next cell"
/// in the collision chains.
pub struct Table<T> {
    data: Vec<Entry<T>>,

    buckets: Vec<usize>,
    bitmask: u64,

    /// Index of the first *possibly* free (non-occupied) cell.
    min_free: usize,
    /// Index of the last occupied cell.
    last_index: usize,
    /// Number of occupied cells.
    real_size: usize,
}

impl<T> Table<T>
where
    T: Default,
{
    /// Create a new table of size `2^bits`.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Storage bits should be in the range 0..=31");

        let capacity = 1 << bits;
        let mut data: Vec<Entry<T>> = Vec::with_capacity(capacity);
        data.resize_with(capacity, Entry::default);
        data[0].occupied = true;

        let buckets_bits = min(bits, 16);
        let buckets_size = 1 << buckets_bits;
        let buckets = vec![0; buckets_size];
        let bitmask = (buckets_size - 1) as u64;

        Self {
            data,
            buckets,
            bitmask,
            min_free: 1,
            last_index: 0,
            real_size: 0,
        }
    }
}

impl<T> Table<T> {
    /// Get the capacity of the table.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
    /// Get the index of the last occupied cell.
    pub fn size(&self) -> usize {
        self.last_index
    }
    /// Get the number of occupied cells.
    pub fn real_size(&self) -> usize {
        self.real_size
    }

    /// Get the reference to the value at the given index.
    pub fn value(&self, index: usize) -> &T {
        &self.data[index].value
    }

    /// Check if the cell at the given index is occupied.
    pub fn is_occupied(&self, index: usize) -> bool {
        self.data[index].occupied
    }
    /// Get the index of the next cell in the collision chain.
    pub fn next(&self, index: usize) -> usize {
        self.data[index].next
    }
    /// Set the index of the next cell in the collision chain.
    pub fn set_next(&mut self, index: usize, next: usize) {
        assert_ne!(index, 0, "Index is 0");
        self.data[index].next = next;
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
    pub fn bucket(&self, i: usize) -> usize {
        self.buckets[i]
    }
    pub fn set_bucket(&mut self, i: usize, index: usize) {
        self.buckets[i] = index;
    }

    /// Allocate a new cell in the table and return its index.
    fn alloc(&mut self) -> Result<usize, TableFull> {
        let index = match (self.min_free..=self.last_index).find(|&i| !self.is_occupied(i)) {
            Some(i) => i,
            None => {
                if self.last_index + 1 >= self.capacity() {
                    return Err(TableFull);
                }
                self.last_index += 1;
                self.last_index
            }
        };

        self.data[index].occupied = true;
        self.min_free = index + 1;
        self.real_size += 1;

        Ok(index)
    }

    /// Release the cell at the given index.
    ///
    /// The caller is responsible for unlinking it from its collision chain.
    pub fn drop(&mut self, index: usize) {
        assert_ne!(index, 0, "Index is 0");
        assert!(self.data[index].occupied, "Cell {} is not occupied", index);

        self.data[index].occupied = false;
        self.data[index].next = 0;
        self.min_free = min(self.min_free, index);
        self.real_size -= 1;
    }

    /// Add a new value to the table (bypassing hash-consing) and return its index.
    pub fn add(&mut self, value: T) -> Result<usize, TableFull> {
        let index = self.alloc()?;

        self.data[index].value = value;
        self.data[index].next = 0;

        Ok(index)
    }
}

impl<T> Table<T>
where
    T: MyHash,
{
    pub fn bucket_index(&self, value: &T) -> usize {
        (value.hash() & self.bitmask) as usize
    }

    /// Put a value into the table and return its index,
    /// reusing the existing cell if an equal value is already stored.
    pub fn put(&mut self, value: T) -> Result<usize, TableFull>
    where
        T: Eq,
    {
        let bucket_index = self.bucket_index(&value);
        let mut index = self.buckets[bucket_index];

        if index == 0 {
            let i = self.add(value)?;
            self.buckets[bucket_index] = i;
            return Ok(i);
        }

        loop {
            if &value == self.value(index) {
                return Ok(index);
            }

            let next = self.next(index);
            if next == 0 {
                let i = self.add(value)?;
                self.set_next(index, i);
                return Ok(i);
            }
            index = next;
        }
    }
}

impl<T> Index<usize> for Table<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.value(index)
    }
}
