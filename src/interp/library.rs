//! Dynamic-library linkage: lazy loading, symbol lookup, and the
//! arity-indexed call trampoline.
//!
//! A library binding is created at build time: the shared object is opened
//! on first use of any of its symbols (and cached per path), the symbol is
//! resolved, and a function slot records the raw pointer together with the
//! declared arity. At run time the trampoline casts the pointer to the
//! matching typed function-pointer shape and invokes it with the argument
//! registers as opaque 64-bit words.
//!
//! Nothing here is safe in the Rust sense. There is no marshalling, no
//! signature checking, and no lifetime management beyond closing the
//! library handle when the interpreter drops; ABI correctness is entirely
//! the caller's responsibility.

use super::Interpreter;
use crate::errors::VmError;
use crate::operand::Word;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ffi::{c_void, CString};

/// Highest arity the dispatch table covers.
pub(crate) const MAX_LIBRARY_ARITY: usize = 62;

/// Resolved symbol address inside a loaded library.
pub(crate) type RawSymbol = *mut c_void;

/// A function slot bound to a library symbol.
pub(crate) struct LibraryFunction {
    pub(crate) symbol: RawSymbol,
    pub(crate) arity: usize,
    pub(crate) name: String,
}

impl Clone for LibraryFunction {
    fn clone(&self) -> Self {
        Self {
            symbol: self.symbol,
            arity: self.arity,
            name: self.name.clone(),
        }
    }
}

/// A loaded library and the slots already created for its symbols.
pub(crate) struct LibraryRecord {
    pub(crate) handle: LibraryHandle,
    /// Symbol name to function-table index; bindings are reused, so calling
    /// the same symbol twice shares one slot.
    pub(crate) functions: HashMap<String, usize>,
}

/// Raw shared-object handle, closed on drop.
pub(crate) struct LibraryHandle(*mut c_void);

#[cfg(unix)]
impl LibraryHandle {
    fn open(path: &str) -> Result<Self, VmError> {
        let c_path = library_cstring(path, path)?;
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY) };
        if handle.is_null() {
            return Err(VmError::LibraryLoad {
                path: path.to_string(),
                reason: dl_error(),
            });
        }
        Ok(Self(handle))
    }

    fn symbol(&self, name: &str, path: &str) -> Result<RawSymbol, VmError> {
        let c_name = library_cstring(name, path)?;
        let symbol = unsafe { libc::dlsym(self.0, c_name.as_ptr()) };
        if symbol.is_null() {
            return Err(VmError::SymbolLookup {
                symbol: name.to_string(),
                path: path.to_string(),
                reason: dl_error(),
            });
        }
        Ok(symbol)
    }
}

#[cfg(unix)]
impl Drop for LibraryHandle {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.0);
        }
    }
}

/// Last `dlerror` message, or a placeholder when none is pending.
#[cfg(unix)]
fn dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "unknown error".to_string();
    }
    unsafe { std::ffi::CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(windows)]
impl LibraryHandle {
    fn open(path: &str) -> Result<Self, VmError> {
        use windows_sys::Win32::System::LibraryLoader::LoadLibraryA;
        let c_path = library_cstring(path, path)?;
        let handle = unsafe { LoadLibraryA(c_path.as_ptr().cast()) };
        if handle.is_null() {
            return Err(VmError::LibraryLoad {
                path: path.to_string(),
                reason: last_os_error(),
            });
        }
        Ok(Self(handle.cast()))
    }

    fn symbol(&self, name: &str, path: &str) -> Result<RawSymbol, VmError> {
        use windows_sys::Win32::System::LibraryLoader::GetProcAddress;
        let c_name = library_cstring(name, path)?;
        let symbol = unsafe { GetProcAddress(self.0.cast(), c_name.as_ptr().cast()) };
        match symbol {
            Some(symbol) => Ok(symbol as RawSymbol),
            None => Err(VmError::SymbolLookup {
                symbol: name.to_string(),
                path: path.to_string(),
                reason: last_os_error(),
            }),
        }
    }
}

#[cfg(windows)]
impl Drop for LibraryHandle {
    fn drop(&mut self) {
        use windows_sys::Win32::System::LibraryLoader::FreeLibrary;
        unsafe {
            FreeLibrary(self.0.cast());
        }
    }
}

#[cfg(windows)]
fn last_os_error() -> String {
    format!(
        "error code {}",
        unsafe { windows_sys::Win32::Foundation::GetLastError() }
    )
}

/// Builds the C string handed to the loader, rejecting interior nuls.
fn library_cstring(value: &str, path: &str) -> Result<CString, VmError> {
    CString::new(value).map_err(|_| VmError::LibraryLoad {
        path: path.to_string(),
        reason: "embedded nul byte".to_string(),
    })
}

impl Interpreter {
    /// Emits a call to `symbol` in the shared library at `library_path`.
    ///
    /// The library is loaded on first use and stays loaded until the
    /// interpreter drops. A `{library, symbol}` pair resolves to one stable
    /// function slot no matter how many calls are emitted. The binding
    /// records `arity` 64-bit arguments (at most 62); everything about the
    /// callee's real signature is unchecked, which is what makes the call
    /// unsafe at run time.
    pub fn create_library_call(
        &mut self,
        library_path: &str,
        symbol: &str,
        arity: usize,
    ) -> Result<(), VmError> {
        if arity > MAX_LIBRARY_ARITY {
            return Err(VmError::ArityTooLarge { arity });
        }

        let record = match self.libraries.entry(library_path.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let handle = LibraryHandle::open(library_path)?;
                self.log.info(&format!("loaded library {library_path}"));
                entry.insert(LibraryRecord {
                    handle,
                    functions: HashMap::new(),
                })
            }
        };

        let index = match record.functions.get(symbol) {
            Some(&index) => index,
            None => {
                let address = record.handle.symbol(symbol, library_path)?;
                let index = self.functions.len();
                self.functions.push(super::Function {
                    kind: super::FunctionKind::Library(LibraryFunction {
                        symbol: address,
                        arity,
                        name: symbol.to_string(),
                    }),
                    locals_size: 0,
                });
                record.functions.insert(symbol.to_string(), index);
                index
            }
        };

        self.emit_call(index);
        Ok(())
    }

    /// Invokes a library binding through the fixed dispatch table: one typed
    /// function-pointer shape per arity in `0..=62`. Argument `i` is read
    /// from register `i + 1` as a full word; the 64-bit return lands in
    /// register 1.
    ///
    /// # Safety
    ///
    /// The symbol must use the C calling convention, take `arity` integer
    /// arguments that fit in 64 bits, and return a value that fits in 64
    /// bits. Nothing is verified; a mismatched signature is undefined
    /// behavior in the callee's ABI.
    pub(crate) unsafe fn dispatch_library_call(
        &mut self,
        function: &LibraryFunction,
    ) -> Result<(), VmError> {
        self.log.debug(&format!(
            "library call {} (arity {})",
            function.name, function.arity
        ));

        let symbol = function.symbol;
        let registers = &self.registers;
        let arg = |index: usize| registers.word(index + 1);

        macro_rules! shape {
            ($($n:literal),*) => {{
                let callee: unsafe extern "C" fn($(shape!(@word $n)),*) -> Word =
                    unsafe { std::mem::transmute(symbol) };
                unsafe { callee($(arg($n)),*) }
            }};
            (@word $n:literal) => { Word };
        }

        let value = match function.arity {
            0 => shape!(),
            1 => shape!(1),
            2 => shape!(1, 2),
            3 => shape!(1, 2, 3),
            4 => shape!(1, 2, 3, 4),
            5 => shape!(1, 2, 3, 4, 5),
            6 => shape!(1, 2, 3, 4, 5, 6),
            7 => shape!(1, 2, 3, 4, 5, 6, 7),
            8 => shape!(1, 2, 3, 4, 5, 6, 7, 8),
            9 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9),
            10 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10),
            11 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11),
            12 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12),
            13 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13),
            14 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14),
            15 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15),
            16 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16),
            17 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17),
            18 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18),
            19 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19),
            20 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20),
            21 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21),
            22 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22),
            23 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23),
            24 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24),
            25 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25),
            26 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26),
            27 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27),
            28 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28),
            29 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29),
            30 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30),
            31 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31),
            32 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32),
            33 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33),
            34 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34),
            35 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35),
            36 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36),
            37 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37),
            38 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38),
            39 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39),
            40 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40),
            41 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41),
            42 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42),
            43 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43),
            44 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44),
            45 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45),
            46 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46),
            47 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47),
            48 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48),
            49 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49),
            50 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50),
            51 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51),
            52 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52),
            53 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53),
            54 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54),
            55 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55),
            56 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56),
            57 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57),
            58 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58),
            59 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59),
            60 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60),
            61 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61),
            62 => shape!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62),
            arity => return Err(VmError::ArityTooLarge { arity }),
        };

        self.registers.set_word(1, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Reg;

    // ==================== Arity bounds ====================

    #[test]
    fn arity_above_table_fails_at_build_time() {
        let mut interp = Interpreter::new();
        assert!(matches!(
            interp.create_library_call("libwhatever.so", "f", 63),
            Err(VmError::ArityTooLarge { arity: 63 })
        ));
        // Nothing was emitted and no load was attempted.
        assert_eq!(interp.bytecode.len(), 1);
        assert!(interp.libraries.is_empty());
    }

    #[test]
    fn missing_library_fails_with_path() {
        let mut interp = Interpreter::new();
        let err = interp
            .create_library_call("/nonexistent/libnope.so", "f", 0)
            .unwrap_err();
        match err {
            VmError::LibraryLoad { path, .. } => {
                assert_eq!(path, "/nonexistent/libnope.so");
            }
            other => panic!("expected LibraryLoad, got {other:?}"),
        }
    }

    // ==================== Against a real library ====================

    #[cfg(target_os = "linux")]
    #[test]
    fn labs_roundtrip_through_the_trampoline() {
        let mut interp = Interpreter::new();
        interp.create_move(Reg::new(2), (-5i64) as Word).unwrap();
        // Argument 1 reads register 2; the result lands in register 1,
        // which is exactly what ret returns from the entry frame.
        interp.create_library_call("libc.so.6", "labs", 1).unwrap();
        interp.create_return();
        assert_eq!(interp.run().unwrap(), 5);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn repeated_symbols_share_one_slot() {
        let mut interp = Interpreter::new();
        interp.create_move(Reg::new(2), 7).unwrap();
        let before = interp.functions.len();
        interp.create_library_call("libc.so.6", "labs", 1).unwrap();
        interp.create_library_call("libc.so.6", "labs", 1).unwrap();
        assert_eq!(interp.functions.len(), before + 1);
        assert_eq!(interp.libraries.len(), 1);
        interp.create_return();
        assert_eq!(interp.run().unwrap(), 7);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn missing_symbol_fails_with_names() {
        let mut interp = Interpreter::new();
        let err = interp
            .create_library_call("libc.so.6", "definitely_not_a_symbol_xyz", 0)
            .unwrap_err();
        match err {
            VmError::SymbolLookup { symbol, path, .. } => {
                assert_eq!(symbol, "definitely_not_a_symbol_xyz");
                assert_eq!(path, "libc.so.6");
            }
            other => panic!("expected SymbolLookup, got {other:?}"),
        }
    }
}
