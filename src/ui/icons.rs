//! Shared UI icons.
//!
//! Each emoji has a plain-text fallback for terminals without Unicode.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Stage indicators
pub static PENDING: Emoji<'_, '_> = Emoji("⏳ ", "[ ]");
pub static AWAITING: Emoji<'_, '_> = Emoji("📨 ", "[>]");
pub static SKIPPED: Emoji<'_, '_> = Emoji("⏭️  ", "[-]");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[R]");

// File indicators
pub static FILE_NEW: Emoji<'_, '_> = Emoji("📄 ", "+");
pub static FILE_MOD: Emoji<'_, '_> = Emoji("📝 ", "~");
pub static FILE_DEL: Emoji<'_, '_> = Emoji("🗑️  ", "-");
