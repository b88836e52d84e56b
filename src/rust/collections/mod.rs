// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod handle_table;
pub mod index_list;
