use bytes::Bytes;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::error::Error;
use crate::framer::Framer;
use crate::store::{to_absolute_exptime, Store, StoreStatus};

/// Maps to `CLIENT_ERROR not a number`, aborting only the current command.
struct NotANumber;

fn parse_u32(token: &[u8]) -> Result<u32, NotANumber> {
    btoi::btou(token).map_err(|_| NotANumber)
}

fn parse_u64(token: &[u8]) -> Result<u64, NotANumber> {
    btoi::btou(token).map_err(|_| NotANumber)
}

fn parse_i64(token: &[u8]) -> Result<i64, NotANumber> {
    btoi::btoi(token).map_err(|_| NotANumber)
}

fn parse_usize(token: &[u8]) -> Result<usize, NotANumber> {
    btoi::btou(token).map_err(|_| NotANumber)
}

pub struct ProtocolEngine {
    framer: Framer,
    store: Arc<Mutex<Store>>,
    clock: Arc<dyn Clock>,
}

impl ProtocolEngine {
    pub fn new(framer: Framer, store: Arc<Mutex<Store>>, clock: Arc<dyn Clock>) -> Self {
        ProtocolEngine {
            framer,
            store,
            clock,
        }
    }

    pub async fn serve(&mut self) -> Result<(), Error> {
        loop {
            let tokens = match self.framer.read_line().await? {
                Some(tokens) => tokens,
                None => return Ok(()),
            };
            if tokens.is_empty() {
                self.write_error().await?;
                continue;
            }

            let now = self.clock.current_unixtime();
            self.dispatch(now, tokens).await?;
        }
    }

    async fn dispatch(&mut self, now: i64, tokens: Vec<Bytes>) -> Result<(), Error> {
        let cmd = tokens[0].clone();
        let args = &tokens[1..];

        match cmd.as_ref() {
            b"get" => self.handle_get(now, args, false).await,
            b"gets" => self.handle_get(now, args, true).await,
            b"gat" => self.handle_gat(now, args, false).await,
            b"gats" => self.handle_gat(now, args, true).await,
            b"set" => self.handle_store(now, args, Storage::Set).await,
            b"add" => self.handle_store(now, args, Storage::Add).await,
            b"replace" => self.handle_store(now, args, Storage::Replace).await,
            b"append" => self.handle_store(now, args, Storage::Append).await,
            b"prepend" => self.handle_store(now, args, Storage::Prepend).await,
            b"cas" => self.handle_cas(now, args).await,
            b"delete" => self.handle_delete(now, args).await,
            b"touch" => self.handle_touch(now, args).await,
            b"incr" => self.handle_arith(now, args, true).await,
            b"decr" => self.handle_arith(now, args, false).await,
            _ => self.write_error().await,
        }
    }

    // --- retrieval -------------------------------------------------------

    async fn handle_get(&mut self, now: i64, args: &[Bytes], with_cas: bool) -> Result<(), Error> {
        if args.is_empty() {
            return self.write_error().await;
        }
        let outcome = match self.store.lock() {
            Ok(store) => LockOutcome::Ready(store.get(now, args)),
            Err(poisoned) => LockOutcome::Poisoned(poisoned.to_string()),
        };
        let entries = match outcome {
            LockOutcome::Ready(v) => v,
            LockOutcome::Poisoned(cause) => {
                tracing::error!(cause, "store mutex poisoned");
                return self.write_server_error("internal error").await;
            }
        };
        self.write_values(&entries, with_cas).await?;
        self.framer.write_line(&[b"END"]).await
    }

    async fn handle_gat(&mut self, now: i64, args: &[Bytes], with_cas: bool) -> Result<(), Error> {
        if args.len() < 2 {
            return self.write_error().await;
        }
        let exptime = match parse_i64(&args[0]) {
            Ok(v) => to_absolute_exptime(v, now),
            Err(_) => return self.write_client_error("not a number").await,
        };
        let keys = &args[1..];
        let outcome = match self.store.lock() {
            Ok(mut store) => LockOutcome::Ready(store.gat(now, keys, exptime)),
            Err(poisoned) => LockOutcome::Poisoned(poisoned.to_string()),
        };
        let entries = match outcome {
            LockOutcome::Ready(v) => v,
            LockOutcome::Poisoned(cause) => {
                tracing::error!(cause, "store mutex poisoned");
                return self.write_server_error("internal error").await;
            }
        };
        self.write_values(&entries, with_cas).await?;
        self.framer.write_line(&[b"END"]).await
    }

    async fn write_values(&mut self, entries: &[crate::entry::Entry], with_cas: bool) -> Result<(), Error> {
        for entry in entries {
            let flags = entry.flags.to_string();
            let len = entry.data.len().to_string();
            if with_cas {
                let unique = entry.unique.to_string();
                self.framer
                    .write_line(&[
                        b"VALUE",
                        &entry.key,
                        flags.as_bytes(),
                        len.as_bytes(),
                        unique.as_bytes(),
                    ])
                    .await?;
            } else {
                self.framer
                    .write_line(&[b"VALUE", &entry.key, flags.as_bytes(), len.as_bytes()])
                    .await?;
            }
            self.framer.write_data(&entry.data).await?;
        }
        Ok(())
    }

    // --- storage -----------------------------------------------------------

    async fn handle_store(&mut self, now: i64, args: &[Bytes], kind: Storage) -> Result<(), Error> {
        if args.len() != 4 {
            return self.write_error().await;
        }
        let key = args[0].clone();
        let (flags, exptime, len) = match parse_header(&args[1], &args[2], &args[3], now) {
            Ok(v) => v,
            Err(_) => return self.write_client_error("not a number").await,
        };
        let data = self.framer.read_data(len).await?;

        let outcome = match self.store.lock() {
            Ok(mut store) => LockOutcome::Ready(match kind {
                Storage::Set => store.set(key, flags, exptime, data),
                Storage::Add => store.add(now, key, flags, exptime, data),
                Storage::Replace => store.replace(now, key, flags, exptime, data),
                Storage::Append => store.append(now, &key, &data),
                Storage::Prepend => store.prepend(now, &key, &data),
            }),
            Err(poisoned) => LockOutcome::Poisoned(poisoned.to_string()),
        };
        let status = match outcome {
            LockOutcome::Ready(v) => v,
            LockOutcome::Poisoned(cause) => {
                tracing::error!(cause, "store mutex poisoned");
                return self.write_server_error("internal error").await;
            }
        };
        self.write_status(status).await
    }

    async fn handle_cas(&mut self, now: i64, args: &[Bytes]) -> Result<(), Error> {
        if args.len() != 5 {
            return self.write_error().await;
        }
        let key = args[0].clone();
        let (flags, exptime, len) = match parse_header(&args[1], &args[2], &args[3], now) {
            Ok(v) => v,
            Err(_) => return self.write_client_error("not a number").await,
        };
        let unique = match parse_u64(&args[4]) {
            Ok(v) => v,
            Err(_) => return self.write_client_error("not a number").await,
        };
        let data = self.framer.read_data(len).await?;

        let outcome = match self.store.lock() {
            Ok(mut store) => LockOutcome::Ready(store.cas(now, key, flags, exptime, data, unique)),
            Err(poisoned) => LockOutcome::Poisoned(poisoned.to_string()),
        };
        let status = match outcome {
            LockOutcome::Ready(v) => v,
            LockOutcome::Poisoned(cause) => {
                tracing::error!(cause, "store mutex poisoned");
                return self.write_server_error("internal error").await;
            }
        };
        self.write_status(status).await
    }

    // --- misc single-key ops ----------------------------------------------

    async fn handle_delete(&mut self, now: i64, args: &[Bytes]) -> Result<(), Error> {
        if args.len() != 1 {
            return self.write_error().await;
        }
        let outcome = match self.store.lock() {
            Ok(mut store) => LockOutcome::Ready(store.delete(now, &args[0])),
            Err(poisoned) => LockOutcome::Poisoned(poisoned.to_string()),
        };
        let status = match outcome {
            LockOutcome::Ready(v) => v,
            LockOutcome::Poisoned(cause) => {
                tracing::error!(cause, "store mutex poisoned");
                return self.write_server_error("internal error").await;
            }
        };
        self.write_status(status).await
    }

    async fn handle_touch(&mut self, now: i64, args: &[Bytes]) -> Result<(), Error> {
        if args.len() != 2 {
            return self.write_error().await;
        }
        let exptime = match parse_i64(&args[1]) {
            Ok(v) => to_absolute_exptime(v, now),
            Err(_) => return self.write_client_error("not a number").await,
        };
        let outcome = match self.store.lock() {
            Ok(mut store) => LockOutcome::Ready(store.touch(now, &args[0], exptime)),
            Err(poisoned) => LockOutcome::Poisoned(poisoned.to_string()),
        };
        let status = match outcome {
            LockOutcome::Ready(v) => v,
            LockOutcome::Poisoned(cause) => {
                tracing::error!(cause, "store mutex poisoned");
                return self.write_server_error("internal error").await;
            }
        };
        self.write_status(status).await
    }

    async fn handle_arith(&mut self, now: i64, args: &[Bytes], incr: bool) -> Result<(), Error> {
        if args.len() != 2 {
            return self.write_error().await;
        }
        let step = match parse_u64(&args[1]) {
            Ok(v) => v,
            Err(_) => return self.write_client_error("not a number").await,
        };

        let outcome = match self.store.lock() {
            Ok(mut store) => LockOutcome::Ready(if incr {
                store.incr(now, &args[0], step)
            } else {
                store.decr(now, &args[0], step)
            }),
            Err(poisoned) => LockOutcome::Poisoned(poisoned.to_string()),
        };
        let outcome = match outcome {
            LockOutcome::Ready(v) => v,
            LockOutcome::Poisoned(cause) => {
                tracing::error!(cause, "store mutex poisoned");
                return self.write_server_error("internal error").await;
            }
        };

        match outcome {
            None => self.write_status(StoreStatus::NotFound).await,
            Some(Ok(value)) => self.framer.write_line(&[&value]).await,
            Some(Err(_)) => {
                self.write_client_error("cannot increment or decrement non-numeric value")
                    .await
            }
        }
    }

    // --- reply helpers -----------------------------------------------------

    async fn write_status(&mut self, status: StoreStatus) -> Result<(), Error> {
        let word: &[u8] = match status {
            StoreStatus::Stored => b"STORED",
            StoreStatus::NotStored => b"NOT_STORED",
            StoreStatus::Exists => b"EXISTS",
            StoreStatus::NotFound => b"NOT_FOUND",
            StoreStatus::Deleted => b"DELETED",
            StoreStatus::Touched => b"TOUCHED",
        };
        self.framer.write_line(&[word]).await
    }

    async fn write_error(&mut self) -> Result<(), Error> {
        self.framer.write_line(&[b"ERROR"]).await
    }

    async fn write_client_error(&mut self, message: &str) -> Result<(), Error> {
        tracing::debug!(message, "client error");
        self.framer
            .write_line(&[b"CLIENT_ERROR", message.as_bytes()])
            .await
    }

    async fn write_server_error(&mut self, message: &str) -> Result<(), Error> {
        self.framer
            .write_line(&[b"SERVER_ERROR", message.as_bytes()])
            .await
    }
}

enum LockOutcome<T> {
    Ready(T),
    Poisoned(String),
}

enum Storage {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

fn parse_header(
    flags: &[u8],
    exptime: &[u8],
    len: &[u8],
    now: i64,
) -> Result<(u32, i64, usize), NotANumber> {
    let flags = parse_u32(flags)?;
    let exptime = to_absolute_exptime(parse_i64(exptime)?, now);
    let len = parse_usize(len)?;
    Ok((flags, exptime, len))
}
