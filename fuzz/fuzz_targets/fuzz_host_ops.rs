#![no_main]

use std::rc::Rc;

use arbitrary::Arbitrary;
use ctxsel_harness::{NodeId, TreeHost};
use ctxsel_runtime::{Contexts, ContextsConfig, ValueSource};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum HostOp {
    Group { parent: u8 },
    Provider { parent: u8, ctx: bool, value: i16 },
    Consumer { parent: u8, ctx: bool, selector: bool },
    Set { node: u8, value: i16, reuse: bool },
    Unmount { node: u8 },
}

#[derive(Arbitrary, Debug)]
struct Input {
    side_cache: bool,
    ops: Vec<HostOp>,
}

fn pick(host: &TreeHost, live: &[NodeId], i: u8) -> Option<NodeId> {
    let candidates: Vec<NodeId> = live
        .iter()
        .copied()
        .filter(|&id| host.kind(id).is_ok_and(|k| k != "consumer"))
        .collect();
    (!candidates.is_empty()).then(|| candidates[usize::from(i) % candidates.len()])
}

fuzz_target!(|input: Input| {
    let source = if input.side_cache {
        ValueSource::SideCache
    } else {
        ValueSource::NativeScope
    };
    let reg = Contexts::with_config(ContextsConfig::default().value_source(source));
    let contexts = [reg.create_context(0i16), reg.create_context(0i16)];
    let mut host = TreeHost::new(reg.clone());
    let mut live = vec![NodeId::ROOT];

    for op in input.ops.iter().take(512) {
        match *op {
            HostOp::Group { parent } => {
                if let Some(parent) = pick(&host, &live, parent)
                    && let Ok(id) = host.mount_group(parent)
                {
                    live.push(id);
                }
            }
            HostOp::Provider { parent, ctx, value } => {
                if let Some(parent) = pick(&host, &live, parent)
                    && let Ok(id) =
                        host.mount_provider(parent, &contexts[usize::from(ctx)], Rc::new(value))
                {
                    live.push(id);
                }
            }
            HostOp::Consumer { parent, ctx, selector } => {
                let Some(parent) = pick(&host, &live, parent) else {
                    continue;
                };
                let context = &contexts[usize::from(ctx)];
                let mounted = if selector {
                    host.mount_consumer_with(parent, context, |v: &i16| v.rem_euclid(4))
                } else {
                    host.mount_consumer(parent, context)
                };
                live.push(mounted.expect("owned context reads"));
            }
            HostOp::Set { node, value, reuse } => {
                let id = live[usize::from(node) % live.len()];
                let next = if reuse {
                    host.provider_value::<i16>(id).ok()
                } else {
                    Some(Rc::new(value))
                };
                if let Some(next) = next {
                    // Non-provider targets are rejected, never a panic.
                    let _ = host.set_value(id, next);
                }
            }
            HostOp::Unmount { node } => {
                let id = live[usize::from(node) % live.len()];
                if id != NodeId::ROOT {
                    host.unmount(id).expect("live node unmounts");
                    live.retain(|&n| host.contains(n));
                }
            }
        }
    }

    let top: Vec<NodeId> = host
        .children(NodeId::ROOT)
        .expect("root is live")
        .to_vec();
    for id in top {
        host.unmount(id).expect("live node unmounts");
    }
    assert_eq!(host.node_count(), 1);
    assert!(reg.bus().is_empty(), "listeners leaked");
});
