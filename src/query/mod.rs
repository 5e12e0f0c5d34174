// SPDX-License-Identifier: Apache-2.0

pub mod routes;
pub mod server;

pub use server::QueryServer;
