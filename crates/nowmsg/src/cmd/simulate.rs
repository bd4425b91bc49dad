use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nowmsg_frame::Value;
use nowmsg_node::{InboundStats, Node, NodeConfig, PeerId, PeerRecord};
use nowmsg_transport::{
    Channel, InterfaceMode, LoopbackMedium, LoopbackOptions, LoopbackRadio, MacAddress,
};
use serde::Serialize;

use crate::cmd::{parse_duration, SimulateArgs};
use crate::exit::{
    frame_error, io_error, node_error, transport_error, CliError, CliResult, SUCCESS, USAGE,
};
use crate::output::{new_table, print_json, value_preview, OutputFormat};

const SENDER: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
const RECEIVER: MacAddress = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
const RECEIVER_ID: PeerId = 7;
const SENDER_ID: PeerId = 1;

/// How long to wait for frames that are still in flight after the last send.
const SETTLE: Duration = Duration::from_millis(500);

type LoopNode = Node<Arc<LoopbackRadio>>;

#[derive(Serialize)]
struct DeliveryOutput {
    seq: u32,
    value: i32,
    outcome: String,
}

#[derive(Serialize)]
struct PeerOutput {
    id: PeerId,
    address: String,
    channel: u8,
    interface: String,
    encrypted: bool,
}

impl From<&PeerRecord> for PeerOutput {
    fn from(peer: &PeerRecord) -> Self {
        Self {
            id: peer.id,
            address: peer.address.to_string(),
            channel: peer.channel.get(),
            interface: peer.interface.to_string(),
            encrypted: peer.is_encrypted(),
        }
    }
}

#[derive(Serialize)]
struct SimulationReport {
    sender: String,
    receiver: String,
    channel: u8,
    delivered: usize,
    failed: usize,
    deliveries: Vec<DeliveryOutput>,
    received: Vec<Value>,
    peers: Vec<PeerOutput>,
    inbound: InboundStats,
    issues: Vec<String>,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(timeout) = &args.timeout {
        let timeout = parse_duration(timeout)?;
        config.send_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    }
    let channel = Channel::new(args.channel).ok_or_else(|| {
        CliError::new(
            USAGE,
            format!("channel {} out of range (0..=13)", args.channel),
        )
    })?;

    let medium = LoopbackMedium::new();
    let (sender, receiver) = start_nodes(&medium, config, channel)?;
    sender.transport().set_completion_mode(args.completion.into());

    let mut deliveries = Vec::new();
    let mut first_error = None;
    for seq in 0..args.count {
        let value = args.value.wrapping_add(seq as i32);
        let outcome = match sender.send(RECEIVER_ID, value) {
            Ok(()) => "delivered".to_string(),
            Err(err) => {
                let outcome = err.to_string();
                first_error.get_or_insert_with(|| node_error("send failed", err));
                outcome
            }
        };
        tracing::debug!(seq, value, %outcome, "send finished");
        deliveries.push(DeliveryOutput {
            seq,
            value,
            outcome,
        });
    }

    let transmitted = sender.transport().transmitted();
    let deadline = Instant::now() + SETTLE;
    while settled_count(&receiver.inbound_stats()) < transmitted && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let mut received = Vec::new();
    while let Some(msg) = receiver.receive_message() {
        received.push(
            msg.to_value()
                .map_err(|err| frame_error("decode failed", err))?,
        );
    }

    let delivered = deliveries
        .iter()
        .filter(|d| d.outcome == "delivered")
        .count();
    let issues = sender
        .status()
        .issues()
        .iter()
        .chain(receiver.status().issues())
        .map(ToString::to_string)
        .collect();

    let report = SimulationReport {
        sender: SENDER.to_string(),
        receiver: RECEIVER.to_string(),
        channel: channel.get(),
        delivered,
        failed: deliveries.len() - delivered,
        deliveries,
        received,
        peers: sender.peers().iter().map(PeerOutput::from).collect(),
        inbound: receiver.inbound_stats(),
        issues,
    };
    tracing::info!(
        delivered = report.delivered,
        failed = report.failed,
        received = report.received.len(),
        "simulation finished"
    );
    print_report(&report, format);

    match first_error {
        Some(err) => Err(err),
        None => Ok(SUCCESS),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<NodeConfig> {
    let Some(path) = path else {
        return Ok(NodeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    NodeConfig::from_json(&text).map_err(|err| node_error("invalid config", err))
}

fn start_nodes(
    medium: &LoopbackMedium,
    config: NodeConfig,
    channel: Channel,
) -> CliResult<(LoopNode, LoopNode)> {
    let station_channel = if channel.is_current() {
        LoopbackOptions::default().channel
    } else {
        channel.get()
    };
    let sender_radio = medium
        .station(SENDER)
        .map_err(|err| transport_error("station setup failed", err))?;
    let receiver_radio = medium
        .station_with(
            RECEIVER,
            LoopbackOptions {
                channel: station_channel,
                ..LoopbackOptions::default()
            },
        )
        .map_err(|err| transport_error("station setup failed", err))?;

    let receiver = Node::new(
        receiver_radio,
        NodeConfig {
            default_channel: 0,
            ..config.clone()
        },
    );
    let sender = Node::new(sender_radio, config);

    sender
        .add_peer(
            RECEIVER_ID,
            RECEIVER,
            i32::from(channel.get()),
            InterfaceMode::Station,
            None,
        )
        .map_err(|err| node_error("add peer failed", err))?;
    receiver
        .add_peer(SENDER_ID, SENDER, 0, InterfaceMode::Station, None)
        .map_err(|err| node_error("add peer failed", err))?;

    Ok((sender, receiver))
}

fn settled_count(stats: &InboundStats) -> u64 {
    stats.accepted + stats.dropped_unverified + stats.dropped_malformed
}

fn print_report(report: &SimulationReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut sends = new_table(vec!["SEQ", "VALUE", "OUTCOME"]);
            for d in &report.deliveries {
                sends.add_row(vec![d.seq.to_string(), d.value.to_string(), d.outcome.clone()]);
            }
            println!("{sends}");

            let mut queue = new_table(vec!["#", "RECEIVED"]);
            for (i, value) in report.received.iter().enumerate() {
                queue.add_row(vec![i.to_string(), value_preview(value)]);
            }
            println!("{queue}");

            let mut peers = new_table(vec!["ID", "ADDRESS", "CHANNEL", "IF", "ENCRYPTED"]);
            for p in &report.peers {
                peers.add_row(vec![
                    p.id.to_string(),
                    p.address.clone(),
                    p.channel.to_string(),
                    p.interface.clone(),
                    p.encrypted.to_string(),
                ]);
            }
            println!("{peers}");
            print_issues(&report.issues);
        }
        OutputFormat::Pretty => {
            println!(
                "{} -> {} on channel {}: {} delivered, {} failed",
                report.sender, report.receiver, report.channel, report.delivered, report.failed
            );
            for d in &report.deliveries {
                println!("  send #{} value={} {}", d.seq, d.value, d.outcome);
            }
            for value in &report.received {
                println!("  received {}", value_preview(value));
            }
            print_issues(&report.issues);
        }
    }
}

fn print_issues(issues: &[String]) {
    for issue in issues {
        println!("issue: {issue}");
    }
}
