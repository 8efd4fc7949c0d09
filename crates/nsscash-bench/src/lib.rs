//! Shared fixture builders for the cache benchmarks.

use nsscash_core::group::Group;
use nsscash_core::passwd::Passwd;

/// A synthetic passwd database with `n` distinct users.
pub fn synthetic_passwds(n: usize) -> Vec<Passwd> {
    (0..n)
        .map(|i| Passwd {
            name: format!("user{i:06}").into_bytes(),
            passwd: b"x".to_vec(),
            uid: 1000 + i as u64,
            gid: 1000 + i as u64,
            gecos: format!("Synthetic User {i}").into_bytes(),
            dir: format!("/home/user{i:06}").into_bytes(),
            shell: b"/bin/bash".to_vec(),
        })
        .collect()
}

/// A synthetic group database; every eighth group carries members.
pub fn synthetic_groups(n: usize) -> Vec<Group> {
    (0..n)
        .map(|i| Group {
            name: format!("group{i:06}").into_bytes(),
            passwd: b"x".to_vec(),
            gid: 1000 + i as u64,
            members: if i % 8 == 0 {
                (0..16).map(|m| format!("user{m:06}").into_bytes()).collect()
            } else {
                Vec::new()
            },
        })
        .collect()
}
