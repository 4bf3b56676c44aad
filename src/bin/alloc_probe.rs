//! ipd-alloc-probe: drive the process-global interposer from the command line.
//!
//! Each operation prints exactly one line so a check can compare stdout:
//!
//! ```text
//! $ RTIPD_ALLOC_LIMIT_PEAK=32 ipd-alloc-probe alloc 16 alloc 32 free 0 remaining
//! ok #0
//! enomem
//! freed #0
//! remaining 32
//! ```

use std::process;
use std::ptr::NonNull;

use clap::Parser;
use ipd_alloc::{global, LimitMode};

#[derive(Parser)]
#[command(name = "ipd-alloc-probe")]
#[command(about = "Run allocation operations against the environment-configured limiter", long_about = None)]
struct Cli {
    /// Install a peak limit instead of reading the environment
    #[arg(long, conflicts_with = "total")]
    peak: Option<usize>,

    /// Install a total limit instead of reading the environment
    #[arg(long)]
    total: Option<usize>,

    /// Operations: alloc N | zalloc C S | resize K N | resizef K N | free K |
    /// remaining | outstanding | mode
    #[arg(trailing_var_arg = true)]
    ops: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Alloc(usize),
    Zalloc(usize, usize),
    Resize(usize, usize),
    ResizeOrFree(usize, usize),
    Free(usize),
    Remaining,
    Outstanding,
    Mode,
}

fn parse_ops(words: &[String]) -> Result<Vec<Op>, String> {
    fn num(it: &mut std::slice::Iter<'_, String>, op: &str) -> Result<usize, String> {
        let word = it
            .next()
            .ok_or_else(|| format!("`{op}` is missing an argument"))?;
        word.parse()
            .map_err(|_| format!("`{op}` expects a number, got `{word}`"))
    }

    let mut ops = Vec::new();
    let mut it = words.iter();
    while let Some(word) = it.next() {
        let op = match word.as_str() {
            "alloc" => Op::Alloc(num(&mut it, word)?),
            "zalloc" => Op::Zalloc(num(&mut it, word)?, num(&mut it, word)?),
            "resize" => Op::Resize(num(&mut it, word)?, num(&mut it, word)?),
            "resizef" => Op::ResizeOrFree(num(&mut it, word)?, num(&mut it, word)?),
            "free" => Op::Free(num(&mut it, word)?),
            "remaining" => Op::Remaining,
            "outstanding" => Op::Outstanding,
            "mode" => Op::Mode,
            other => return Err(format!("unknown operation `{other}`")),
        };
        ops.push(op);
    }
    Ok(ops)
}

/// Live blocks by slot number; a slot is `None` once released.
struct Slots(Vec<Option<NonNull<u8>>>);

impl Slots {
    fn get(&self, slot: usize) -> Result<NonNull<u8>, String> {
        self.0
            .get(slot)
            .copied()
            .flatten()
            .ok_or_else(|| format!("slot #{slot} is not live"))
    }

    fn push(&mut self, ptr: NonNull<u8>) -> usize {
        self.0.push(Some(ptr));
        self.0.len() - 1
    }
}

fn run(op: Op, slots: &mut Slots) -> Result<String, String> {
    let line = match op {
        Op::Alloc(n) => match global::allocate(n) {
            Ok(ptr) => format!("ok #{}", slots.push(ptr)),
            Err(_) => "enomem".to_string(),
        },
        Op::Zalloc(count, size) => match global::allocate_zeroed(count, size) {
            Ok(ptr) => format!("ok #{}", slots.push(ptr)),
            Err(_) => "enomem".to_string(),
        },
        Op::Resize(slot, n) => {
            let old = slots.get(slot)?;
            // SAFETY: `old` is live and came from the global interposer.
            match unsafe { global::resize(Some(old), n) } {
                Ok(ptr) => {
                    slots.0[slot] = Some(ptr);
                    format!("ok #{slot}")
                }
                Err(_) => "enomem".to_string(),
            }
        }
        Op::ResizeOrFree(slot, n) => {
            let old = slots.get(slot)?;
            // SAFETY: as above; on failure the block is gone, so the slot is cleared.
            match unsafe { global::resize_or_release(Some(old), n) } {
                Ok(ptr) => {
                    slots.0[slot] = Some(ptr);
                    format!("ok #{slot}")
                }
                Err(_) => {
                    slots.0[slot] = None;
                    "enomem".to_string()
                }
            }
        }
        Op::Free(slot) => {
            let ptr = slots.get(slot)?;
            // SAFETY: `ptr` is live; the slot is cleared so it is released once.
            unsafe { global::release(Some(ptr)) };
            slots.0[slot] = None;
            format!("freed #{slot}")
        }
        Op::Remaining => format!("remaining {}", global::remaining()),
        Op::Outstanding => format!(
            "outstanding {} in {}",
            global::outstanding_bytes(),
            global::live_allocations()
        ),
        Op::Mode => {
            let mode = match global::mode() {
                LimitMode::Uninitialized => "uninitialized",
                LimitMode::NoLimit => "none",
                LimitMode::Total => "total",
                LimitMode::Peak => "peak",
            };
            format!("mode {mode}")
        }
    };
    Ok(line)
}

fn main() {
    let cli = Cli::parse();

    let ops = match parse_ops(&cli.ops) {
        Ok(ops) => ops,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    if let Some(bytes) = cli.peak {
        global::set_peak_limit(bytes);
    } else if let Some(bytes) = cli.total {
        global::set_total_limit(bytes);
    }
    global::ensure_init();

    let mut slots = Slots(Vec::new());
    for op in ops {
        match run(op, &mut slots) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_ops() {
        assert_eq!(
            parse_ops(&words("alloc 8 zalloc 2 4 resize 0 16 free 1 mode")).unwrap(),
            vec![
                Op::Alloc(8),
                Op::Zalloc(2, 4),
                Op::Resize(0, 16),
                Op::Free(1),
                Op::Mode
            ]
        );
    }

    #[test]
    fn test_parse_ops_rejects_bad_input() {
        assert!(parse_ops(&words("alloc")).is_err());
        assert!(parse_ops(&words("alloc x")).is_err());
        assert!(parse_ops(&words("explode")).is_err());
    }
}
