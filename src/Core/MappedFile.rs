// Memory-mapped backing file for the persisted ring.
// Unix goes through libc (open + ftruncate + mmap), everything else through memmap2.

use std::fmt::Debug;
use std::io;
use std::path::Path;

/// A read-write, file-backed mapping shared with its file.
///
/// Dropping the backend unmaps the view first and closes the file handle second.
pub trait MappingBackend: Send + Sync + Debug {
    /// Get a pointer to the mapped memory region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Path of the backing file
    fn path(&self) -> &Path;
}

/// Open (creating if needed) the file at `path`, extend it to exactly `size`
/// bytes and map all of it read-write.
///
/// Existing contents are kept; the caller decides whether the file is
/// compatible before calling this.
pub fn create_mapped_file(path: &Path, size: usize) -> io::Result<Box<dyn MappingBackend>> {
    if size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot map an empty region",
        ));
    }

    #[cfg(unix)]
    {
        Ok(Box::new(unix::UnixMappedFile::create(path, size)?))
    }

    #[cfg(not(unix))]
    {
        Ok(Box::new(portable::PortableMappedFile::create(path, size)?))
    }
}

#[cfg(unix)]
mod unix {
    use super::MappingBackend;
    use std::fs::OpenOptions;
    use std::io;
    use std::os::fd::IntoRawFd;
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::RawFd;
    use std::path::{Path, PathBuf};
    use std::ptr::{self, NonNull};

    #[derive(Debug)]
    pub struct UnixMappedFile {
        ptr: NonNull<u8>,
        size: usize,
        fd: RawFd,
        path: PathBuf,
    }

    // The mapping is plain memory; all access to it is serialized by the owner.
    unsafe impl Send for UnixMappedFile {}
    unsafe impl Sync for UnixMappedFile {}

    impl UnixMappedFile {
        pub fn create(path: &Path, size: usize) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .mode(0o666)
                .open(path)?;

            // Keep the file descriptor alive for the lifetime of the mapping
            let fd = file.into_raw_fd();

            if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }

            let raw = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    fd,
                    0,
                )
            };

            if raw == libc::MAP_FAILED {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }

            let ptr = match NonNull::new(raw as *mut u8) {
                Some(ptr) => ptr,
                None => {
                    unsafe {
                        libc::munmap(raw, size);
                        libc::close(fd);
                    }
                    return Err(io::Error::other("mmap returned a null mapping"));
                }
            };

            Ok(Self {
                ptr,
                size,
                fd,
                path: path.to_path_buf(),
            })
        }
    }

    impl Drop for UnixMappedFile {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
                libc::close(self.fd);
            }
        }
    }

    impl MappingBackend for UnixMappedFile {
        fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        fn size(&self) -> usize {
            self.size
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }
}

#[cfg(not(unix))]
mod portable {
    use super::MappingBackend;
    use memmap2::{MmapMut, MmapOptions};
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::path::{Path, PathBuf};

    #[derive(Debug)]
    pub struct PortableMappedFile {
        // Field order matters: the view is dropped (unmapped) before the file is closed.
        map: MmapMut,
        _file: File,
        ptr: *mut u8,
        path: PathBuf,
    }

    unsafe impl Send for PortableMappedFile {}
    unsafe impl Sync for PortableMappedFile {}

    impl PortableMappedFile {
        pub fn create(path: &Path, size: usize) -> io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            file.set_len(size as u64)?;

            let mut map = unsafe { MmapOptions::new().len(size).map_mut(&file)? };
            let ptr = map.as_mut_ptr();

            Ok(Self {
                map,
                _file: file,
                ptr,
                path: path.to_path_buf(),
            })
        }
    }

    impl MappingBackend for PortableMappedFile {
        fn as_ptr(&self) -> *mut u8 {
            self.ptr
        }

        fn size(&self) -> usize {
            self.map.len()
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }
}

/// Length of an existing file at `path`, or `None` if there is no such file.
pub fn existing_len(path: &Path) -> io::Result<Option<u64>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
