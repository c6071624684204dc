// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! etcd membership as reported by `etcdctl member list -w json`.

use crate::infrastructure::constants::{ETCD_CA_FILE, ETCD_CERT_FILE, ETCD_ENDPOINT, ETCD_KEY_FILE};
use crate::shared::error::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MemberList {
    #[serde(default)]
    members: Vec<RawMember>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(rename = "ID")]
    id: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtcdMember {
    /// Hex member id, the form `member remove` expects.
    pub id: String,
    pub name: String,
}

pub fn parse_member_list(json: &str) -> Result<Vec<EtcdMember>> {
    let list: MemberList = serde_json::from_str(json)?;
    Ok(list
        .members
        .into_iter()
        .map(|m| EtcdMember {
            id: format!("{:x}", m.id),
            name: m.name,
        })
        .collect())
}

pub fn find_member<'a>(members: &'a [EtcdMember], name: &str) -> Option<&'a EtcdMember> {
    members.iter().find(|m| m.name == name)
}

fn etcdctl(args: &[&str]) -> Vec<String> {
    [
        "etcdctl".to_string(),
        format!("--endpoints={}", ETCD_ENDPOINT),
        format!("--cacert={}", ETCD_CA_FILE),
        format!("--cert={}", ETCD_CERT_FILE),
        format!("--key={}", ETCD_KEY_FILE),
    ]
    .into_iter()
    .chain(args.iter().map(|a| a.to_string()))
    .collect()
}

pub fn member_list_command() -> Vec<String> {
    etcdctl(&["member", "list", "-w", "json"])
}

pub fn member_remove_command(id: &str) -> Vec<String> {
    etcdctl(&["member", "remove", id])
}
