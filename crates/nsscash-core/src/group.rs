//! Group databases: parsing, serialization and record access.

use log::warn;

use crate::format::{self, align_buffer_to};
use crate::passwd::parse_id;
use crate::{lossy, Error};

/// Size of the fixed part of a serialized group record:
/// gid, two offsets, member count and the data size.
pub const ENTRY_HEADER_SIZE: usize = 16;

/// A group entry (analogous to `struct group`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Group name.
    pub name: Vec<u8>,
    /// Encrypted password (usually "x" or empty).
    pub passwd: Vec<u8>,
    /// Group ID.
    pub gid: u64,
    /// Member names in file order; may be empty.
    pub members: Vec<Vec<u8>>,
}

/// Parse a full group database.
///
/// Every record must be terminated by `\n`, including the last one; a
/// group line has exactly 4 colon-separated fields. An empty member field
/// yields an empty list, not a single empty name.
pub fn parse_groups(input: &[u8]) -> Result<Vec<Group>, Error> {
    let mut res = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        let nl = match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => nl,
            None => return Err(Error::MissingNewline(lossy(rest))),
        };
        let line = &rest[..nl];
        rest = &rest[nl + 1..];

        let fields: Vec<&[u8]> = line.split(|&b| b == b':').collect();
        if fields.len() != 4 {
            return Err(Error::InvalidLine(lossy(line)));
        }

        let members = if fields[3].is_empty() {
            Vec::new()
        } else {
            fields[3].split(|&b| b == b',').map(<[u8]>::to_vec).collect()
        };
        res.push(Group {
            name: fields[0].to_vec(),
            passwd: fields[1].to_vec(),
            gid: parse_id(fields[2], "gid", line)?,
            members,
        });
    }
    Ok(res)
}

/// Serialize a single record.
///
/// The data block is `name\0 passwd\0 [pad to 2] member_offsets[] members`,
/// with each member offset relative to the start of the block.
pub fn serialize_group(g: &Group) -> Result<Vec<u8>, Error> {
    // Member strings and their offsets within the concatenated block
    let mut mems = Vec::new();
    let mut mems_off = Vec::with_capacity(g.members.len());
    for m in &g.members {
        mems_off.push(mems.len());
        mems.extend_from_slice(m);
        mems.push(0);
    }

    let mut data = Vec::with_capacity(
        g.name.len() + g.passwd.len() + 3 + 2 * g.members.len() + mems.len(),
    );
    data.extend_from_slice(&g.name);
    data.push(0);
    let off_passwd = data.len();
    data.extend_from_slice(&g.passwd);
    data.push(0);
    align_buffer_to(&mut data, 2); // align the member offset table
    let off_mem_off = data.len();
    let off_mem = off_mem_off + 2 * g.members.len();

    // Everything is addressed by u16 offsets, so check before emitting the
    // offset table (a wrapped offset must never reach the file)
    if off_mem + mems.len() > u16::MAX as usize {
        return Err(Error::TooLarge {
            db: "group",
            size: off_mem + mems.len(),
            name: lossy(&g.name),
        });
    }
    for o in &mems_off {
        data.extend_from_slice(&((off_mem + o) as u16).to_le_bytes());
    }
    data.extend_from_slice(&mems);

    let mut res = Vec::with_capacity(ENTRY_HEADER_SIZE + data.len() + 7);
    res.extend_from_slice(&g.gid.to_le_bytes());
    res.extend_from_slice(&(off_passwd as u16).to_le_bytes());
    res.extend_from_slice(&(off_mem_off as u16).to_le_bytes());
    res.extend_from_slice(&(g.members.len() as u16).to_le_bytes());
    res.extend_from_slice(&(data.len() as u16).to_le_bytes());
    res.extend_from_slice(&data);
    // Keep the leading u64 of the next record 8-byte aligned under mmap
    align_buffer_to(&mut res, 8);
    Ok(res)
}

/// Serialize a group database into a complete cache file; indices as for
/// passwd (input order, ascending gid, ascending name, both stable).
pub fn serialize_groups(grs: &[Group]) -> Result<Vec<u8>, Error> {
    let mut data = Vec::new();
    let mut offsets = Vec::with_capacity(grs.len());
    for g in grs {
        offsets.push(data.len() as u64);
        data.extend_from_slice(&serialize_group(g)?);
    }

    let index_orig: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();

    let mut by_id: Vec<usize> = (0..grs.len()).collect();
    by_id.sort_by_key(|&i| grs[i].gid);
    let index_id: Vec<u8> = by_id
        .iter()
        .flat_map(|&i| offsets[i].to_le_bytes())
        .collect();

    let mut by_name: Vec<usize> = (0..grs.len()).collect();
    by_name.sort_by(|&a, &b| grs[a].name.cmp(&grs[b].name));
    for w in by_name.windows(2) {
        if grs[w[0]].name == grs[w[1]].name {
            warn!("duplicate group entry for {:?}", lossy(&grs[w[0]].name));
        }
    }
    let index_name: Vec<u8> = by_name
        .iter()
        .flat_map(|&i| offsets[i].to_le_bytes())
        .collect();

    format::write_cache(grs.len() as u64, &index_orig, &index_id, &index_name, &data)
}

/// Zero-copy view of one serialized group record inside a data region.
#[derive(Debug, Clone, Copy)]
pub struct GroupEntry<'a> {
    pub gid: u64,
    pub off_passwd: u16,
    pub off_mem_off: u16,
    pub mem_count: u16,
    /// `name\0 passwd\0 [pad] member_offsets[] members`; name starts at 0.
    pub data: &'a [u8],
}

impl<'a> GroupEntry<'a> {
    /// Decode the record starting at `offset` in the data region.
    ///
    /// Validates that the member offset table itself lies inside `data`,
    /// so [`member_offset`](Self::member_offset) cannot fail afterwards.
    pub fn parse(region: &'a [u8], offset: u64) -> Option<Self> {
        let base = usize::try_from(offset).ok()?;
        let size = format::read_u16(region, base.checked_add(14)?)? as usize;
        let start = base.checked_add(ENTRY_HEADER_SIZE)?;
        let data = region.get(start..start.checked_add(size)?)?;
        let entry = GroupEntry {
            gid: format::read_u64(region, base)?,
            off_passwd: format::read_u16(region, base + 8)?,
            off_mem_off: format::read_u16(region, base + 10)?,
            mem_count: format::read_u16(region, base + 12)?,
            data,
        };
        let table_end = (entry.off_mem_off as usize)
            .checked_add(2 * entry.mem_count as usize)?;
        if table_end > data.len() {
            return None;
        }
        Some(entry)
    }

    pub fn name(&self) -> &'a [u8] {
        format::cstr_at(self.data, 0)
    }

    /// Offset of member `i`'s string within `data`.
    pub fn member_offset(&self, i: usize) -> Option<u16> {
        if i >= self.mem_count as usize {
            return None;
        }
        format::read_u16(self.data, self.off_mem_off as usize + 2 * i)
    }

    /// Decode into an owned record (tests and offline tooling).
    pub fn to_group(&self) -> Group {
        let members = (0..self.mem_count as usize)
            .map(|i| {
                let off = self.member_offset(i).unwrap_or(0) as usize;
                format::cstr_at(self.data, off).to_vec()
            })
            .collect();
        Group {
            name: self.name().to_vec(),
            passwd: format::cstr_at(self.data, self.off_passwd as usize).to_vec(),
            gid: self.gid,
            members,
        }
    }
}
