// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

/// Maximum number of cores that may participate in scheduling (one bit per core in a core mask).
pub const MAX_CORES: usize = 64;

/// Hard ceiling on concurrently live handles.
pub const MAX_HANDLES: usize = 256;

/// Hard ceiling on concurrently live fibers. A fiber always owns a handle, so this never exceeds [MAX_HANDLES].
pub const MAX_THREADS: usize = MAX_HANDLES;

/// Stack sizes must be a multiple of this value.
pub const STACK_ALIGNMENT: usize = 4096;

/// Smallest stack a fiber may be created with.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Maximum length of a fiber name, in bytes.
pub const MAX_THREAD_NAME_LEN: usize = 32;

/// Highest (most urgent) priority.
pub const PRIORITY_HIGHEST: u8 = 0;

/// Lowest (least urgent) priority.
pub const PRIORITY_LOWEST: u8 = 63;

/// Priority given to fibers that do not ask for one.
pub const PRIORITY_DEFAULT: u8 = 44;
