use std::ops::{Deref, DerefMut};

/// Best-effort memory locking for secrets.
///
/// Owns the secret and pins its pages for the guard's lifetime. This reduces
/// exposure to swapping on supported OSes, but it is not a complete
/// mitigation:
/// - Small buffers share pages with other allocations.
/// - Locking may fail due to OS limits; failure is non-fatal.
///
/// The secret is boxed so the locked region does not move with the guard.
/// Zeroization of the contents is the inner type's responsibility
/// (`zeroize::Zeroizing` in all current uses).
pub struct MemoryLock<T: AsRef<[u8]>> {
    inner: Box<T>,
    locked: bool,
}

impl<T: AsRef<[u8]>> MemoryLock<T> {
    pub fn new(inner: T) -> Self {
        let inner = Box::new(inner);
        let bytes = (*inner).as_ref();
        let locked = !bytes.is_empty() && unsafe { lock_region(bytes.as_ptr(), bytes.len()) };
        Self { inner, locked }
    }
}

impl<T: AsRef<[u8]>> Deref for MemoryLock<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: AsRef<[u8]>> DerefMut for MemoryLock<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: AsRef<[u8]>> Drop for MemoryLock<T> {
    fn drop(&mut self) {
        if self.locked {
            let bytes = (*self.inner).as_ref();
            unsafe { unlock_region(bytes.as_ptr(), bytes.len()) };
        }
    }
}

unsafe fn lock_region(ptr: *const u8, len: usize) -> bool {
    #[cfg(unix)]
    {
        libc::mlock(ptr as *const core::ffi::c_void, len) == 0
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Memory::VirtualLock;
        VirtualLock(ptr as *const core::ffi::c_void, len) != 0
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (ptr, len);
        false
    }
}

unsafe fn unlock_region(ptr: *const u8, len: usize) {
    #[cfg(unix)]
    {
        let _ = libc::munlock(ptr as *const core::ffi::c_void, len);
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Memory::VirtualUnlock;
        let _ = VirtualUnlock(ptr as *const core::ffi::c_void, len);
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (ptr, len);
    }
}
