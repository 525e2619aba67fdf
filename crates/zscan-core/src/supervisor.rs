//! Thread orchestration: spawns the configured number of sender threads
//! plus one receive thread, hands each its shard of the address space, and
//! joins them all before returning.

use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::backend::{NullSink, RawIpSocket};
use crate::config::Config;
use crate::error::Result;
use crate::iterator::Shard;
use crate::recv::RecvEngine;
use crate::send::{PacketSink, SendEngine};
use crate::state::{RecvState, SendState};
use crate::validator::Validator;

pub struct RunSummary {
    pub send: Arc<SendState>,
    pub recv: Arc<RecvState>,
}

pub fn run(config: Arc<Config>, start_exponent: u64, capture_device: &str) -> Result<RunSummary> {
    let validator = Arc::new(Validator::new());
    let send_state = Arc::new(SendState::new());
    let recv_state = Arc::new(RecvState::new());
    let send_mutex = Arc::new(Mutex::new(()));

    let mut cap = open_capture(capture_device)?;

    let recv_handle = {
        let config = config.clone();
        let validator = validator.clone();
        let recv_state = recv_state.clone();
        let send_state = send_state.clone();
        std::thread::Builder::new()
            .name("zscan-recv".to_string())
            .spawn(move || {
                let mut engine = RecvEngine::new(config, validator, recv_state, send_state);
                if let Err(e) = engine.run(&mut cap) {
                    error!(error = %e, "receive thread exited with error");
                }
            })
            .expect("failed to spawn receive thread")
    };

    // wait for the receive thread to be listening before any packet leaves,
    // so early replies during a fast local test aren't missed
    while !recv_state.is_ready() {
        std::thread::yield_now();
    }

    send_state.mark_started();
    let mut send_handles = Vec::new();
    for t in 0..config.sender_threads {
        let config = config.clone();
        let validator = validator.clone();
        let send_mutex = send_mutex.clone();
        let send_state = send_state.clone();
        let recv_state_for_send = recv_state.clone();
        let shard = Shard::new(
            config.shard_index,
            config.total_shards,
            t,
            config.sender_threads,
            start_exponent,
            config.target_space.clone(),
            config.max_targets,
        )?;
        let handle = std::thread::Builder::new()
            .name(format!("zscan-send-{t}"))
            .spawn(move || {
                let sink: Box<dyn PacketSink> = if config.dryrun {
                    Box::new(NullSink)
                } else {
                    match RawIpSocket::new() {
                        Ok(s) => Box::new(s),
                        Err(e) => {
                            error!(thread = t, error = %e, "failed to open raw socket");
                            return;
                        }
                    }
                };
                let engine = SendEngine {
                    config: config.clone(),
                    validator,
                    send_mutex,
                    state: send_state,
                    recv_state: recv_state_for_send,
                    sink: sink.as_ref(),
                    thread_index: t,
                };
                engine.run(shard);
            })
            .expect("failed to spawn send thread");
        send_handles.push(handle);
    }

    for h in send_handles {
        let _ = h.join();
    }
    send_state.mark_finished();
    info!("all send threads finished, waiting out cooldown");

    let _ = recv_handle.join();

    Ok(RunSummary { send: send_state, recv: recv_state })
}

fn open_capture(device: &str) -> Result<pcap::Capture<pcap::Active>> {
    pcap::Capture::from_device(device)
        .map_err(crate::error::Error::CaptureInit)?
        .promisc(true)
        .snaplen(128)
        .timeout(100)
        .open()
        .map_err(crate::error::Error::CaptureInit)
}
