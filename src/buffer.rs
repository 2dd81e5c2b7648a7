// SPDX-License-Identifier: GPL-3.0-only

//! Zero-copy buffer views over sample memory
//!
//! A [`BufferView`] either borrows native memory for the extent of one
//! callback, owns a copy, or has been released. Borrowed views carry the
//! callback's lifetime, so they cannot escape it; [`BufferView::to_owned_view`]
//! is the explicit copy that does.
//!
//! [`BufferView::from_raw_parts`] is the only place foreign memory becomes a
//! slice.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Typed view over sample memory
pub enum BufferView<'a, T> {
    /// Native memory valid for the delivering callback
    Borrowed(&'a [T]),
    /// Owned copy, safe to retain; a range within a shared allocation
    Owned(Arc<[T]>, Range<usize>),
    /// Released; reads return an empty slice
    Released,
}

impl<'a, T> BufferView<'a, T> {
    /// Wrap native memory without copying
    ///
    /// A null pointer or zero length yields an empty borrowed view.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` initialized, properly aligned values of `T`
    /// that stay valid and unmodified for `'a`. Callers tie `'a` to the
    /// callback that delivered the memory.
    pub unsafe fn from_raw_parts(ptr: *const T, len: usize) -> Self {
        if ptr.is_null() || len == 0 {
            return BufferView::Borrowed(&[]);
        }
        debug_assert!(ptr.is_aligned(), "misaligned native buffer");
        // SAFETY: upheld by the caller per the contract above
        BufferView::Borrowed(unsafe { std::slice::from_raw_parts(ptr, len) })
    }

    /// A view that has been released
    pub fn released() -> Self {
        BufferView::Released
    }

    /// View a range of a shared allocation
    ///
    /// The range is clamped to the allocation.
    pub fn shared(data: Arc<[T]>, range: Range<usize>) -> Self {
        let end = range.end.min(data.len());
        let start = range.start.min(end);
        BufferView::Owned(data, start..end)
    }

    /// The viewed elements; empty once released
    pub fn as_slice(&self) -> &[T] {
        match self {
            BufferView::Borrowed(slice) => slice,
            BufferView::Owned(data, range) => &data[range.clone()],
            BufferView::Released => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn is_released(&self) -> bool {
        matches!(self, BufferView::Released)
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self, BufferView::Borrowed(_))
    }

    /// Address of the first element, for layout detection
    pub fn as_ptr(&self) -> *const T {
        self.as_slice().as_ptr()
    }
}

impl<T: Copy> BufferView<'_, T> {
    /// Copy into an owned view that outlives the callback
    pub fn to_owned_view(&self) -> BufferView<'static, T> {
        match self {
            BufferView::Released => BufferView::Released,
            BufferView::Owned(data, range) => BufferView::Owned(Arc::clone(data), range.clone()),
            BufferView::Borrowed(slice) => (*slice).into(),
        }
    }
}

impl<T: Copy> From<Vec<T>> for BufferView<'static, T> {
    fn from(data: Vec<T>) -> Self {
        let len = data.len();
        BufferView::Owned(Arc::from(data), 0..len)
    }
}

impl<T: Copy> From<&[T]> for BufferView<'static, T> {
    fn from(data: &[T]) -> Self {
        BufferView::Owned(Arc::from(data), 0..data.len())
    }
}

impl<T> std::ops::Deref for BufferView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> fmt::Debug for BufferView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            BufferView::Borrowed(_) => "borrowed",
            BufferView::Owned(..) => "owned",
            BufferView::Released => "released",
        };
        write!(f, "BufferView({state}, len={})", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_pointer_is_empty() {
        let view: BufferView<'_, f32> = unsafe { BufferView::from_raw_parts(std::ptr::null(), 16) };
        assert!(view.is_empty());
        assert!(!view.is_released());
    }

    #[test]
    fn test_borrowed_view_reads_native_memory() {
        let native = vec![1u8, 2, 3, 4];
        let view = unsafe { BufferView::from_raw_parts(native.as_ptr(), native.len()) };
        assert!(view.is_borrowed());
        assert_eq!(&*view, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_owned_view_outlives_source() {
        let owned = {
            let native = vec![0.5f32, -0.5];
            let view = unsafe { BufferView::from_raw_parts(native.as_ptr(), native.len()) };
            view.to_owned_view()
        };
        assert_eq!(owned.as_slice(), &[0.5, -0.5]);
    }

    #[test]
    fn test_shared_ranges_clamp() {
        let data: Arc<[u8]> = Arc::from(vec![1u8, 2, 3, 4, 5]);
        let view = BufferView::shared(Arc::clone(&data), 1..3);
        assert_eq!(&*view, &[2, 3]);
        let clamped = BufferView::shared(data, 4..10);
        assert_eq!(&*clamped, &[5]);
    }

    #[test]
    fn test_released_view() {
        let view = BufferView::<u8>::released();
        assert!(view.is_released());
        assert_eq!(view.len(), 0);
        assert!(view.to_owned_view().is_released());
    }
}
