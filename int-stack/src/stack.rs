/// A flat LIFO buffer of integers for driving depth-first traversals
/// without recursion.
///
/// The backing storage grows by 50% when full and is never shrunk, so a
/// stack reused across many traversals settles at its peak size.
pub struct IntStack<T = u32> {
    data: Box<[T]>,
    len: usize,
}

impl<T: Copy + Default> IntStack<T> {
    pub fn with_capacity(initial: usize) -> Self {
        assert!(initial > 0, "IntStack needs a non-zero initial capacity");
        Self {
            data: vec![T::default(); initial].into_boxed_slice(),
            len: 0,
        }
    }

    #[inline(always)]
    pub fn push(&mut self, item: T) {
        if self.len == self.data.len() {
            self.grow();
        }
        self.data[self.len] = item;
        self.len += 1;
    }

    #[inline(always)]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.data[self.len])
    }

    #[cold]
    fn grow(&mut self) {
        let old = self.data.len();
        // 1.5x, but a capacity of 1 must still make progress
        let new = (old + old / 2).max(old + 1);
        let mut data = vec![T::default(); new].into_boxed_slice();
        data[..old].copy_from_slice(&self.data);
        self.data = data;
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of elements the stack holds before it has to grow again.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Drops all elements but keeps the backing storage.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}
