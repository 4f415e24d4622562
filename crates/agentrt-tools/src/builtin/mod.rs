// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod code_interpreter;
pub mod edit;
pub mod glob;
pub mod grep;
pub mod image_generation;
pub mod list;
pub mod question;
pub mod read;
pub mod shell;
pub mod task;
pub mod web_fetch;
pub mod web_search;
pub mod write;
