#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lodestone_protocol::NotificationQueue;
use lodestone_types::{ReplicaIdx, UpdateNotification, Version};

const CAPACITY: usize = 8;

#[derive(Debug, Arbitrary)]
enum Op {
    Insert {
        origin: u8,
        start: u16,
        len: u8,
    },
    Pop {
        global: u16,
    },
}

fuzz_target!(|ops: Vec<Op>| {
    let mut queue: NotificationQueue<u16> = NotificationQueue::new(CAPACITY);

    for op in ops {
        match op {
            Op::Insert { origin, start, len } => {
                let len = usize::from(len % 16) + 1;
                let start = u64::from(start);
                let updates: Vec<u16> = (0..len as u16).collect();
                let notification = UpdateNotification {
                    origin: ReplicaIdx::new(origin % 4),
                    version: Version::new(start + len as u64),
                    updates,
                    etag: None,
                };
                queue.insert(notification);
            }
            Op::Pop { global } => {
                let global = Version::new(u64::from(global));
                let (_, popped) = queue.pop_applicable(global);
                if let Some(n) = popped {
                    assert_eq!(n.start_version(), Some(global));
                }
            }
        }
        assert!(queue.len() <= CAPACITY);
    }
});
