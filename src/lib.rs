// SPDX-License-Identifier: Apache-2.0

pub mod capture;
pub mod init;
pub mod listener;
pub mod query;
pub mod tail;
