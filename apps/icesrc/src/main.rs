// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    icesrc::run().await
}
