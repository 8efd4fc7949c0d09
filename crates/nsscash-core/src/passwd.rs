//! Passwd databases: parsing, serialization and record access.
//!
//! Parses `/etc/passwd` style text into [`Passwd`] records and serializes
//! them into the binary cache format. Field bytes are opaque (no encoding
//! is imposed); only uid and gid must be decimal.

use log::warn;

use crate::format::{self, align_buffer_to};
use crate::{lossy, Error};

/// Size of the fixed part of a serialized passwd record:
/// uid, gid, four string offsets and the data size.
pub const ENTRY_HEADER_SIZE: usize = 26;

/// A passwd entry (analogous to `struct passwd`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passwd {
    /// Login name.
    pub name: Vec<u8>,
    /// Encrypted password (usually "x" for shadow).
    pub passwd: Vec<u8>,
    /// User ID.
    pub uid: u64,
    /// Group ID.
    pub gid: u64,
    /// User information (GECOS field).
    pub gecos: Vec<u8>,
    /// Home directory.
    pub dir: Vec<u8>,
    /// Login shell.
    pub shell: Vec<u8>,
}

pub(crate) fn parse_id(field: &[u8], name: &'static str, line: &[u8]) -> Result<u64, Error> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::InvalidId {
            field: name,
            line: lossy(line),
        })
}

/// Parse a full passwd database.
///
/// Every record must be terminated by `\n`, including the last one; a
/// passwd line has exactly 7 colon-separated fields. Duplicates are kept.
pub fn parse_passwds(input: &[u8]) -> Result<Vec<Passwd>, Error> {
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
        if fields.len() != 7 {
            return Err(Error::InvalidLine(lossy(line)));
        }

        res.push(Passwd {
            name: fields[0].to_vec(),
            passwd: fields[1].to_vec(),
            uid: parse_id(fields[2], "uid", line)?,
            gid: parse_id(fields[3], "gid", line)?,
            gecos: fields[4].to_vec(),
            dir: fields[5].to_vec(),
            shell: fields[6].to_vec(),
        });
    }
    Ok(res)
}

/// Serialize a single record: the fixed header, the concatenated
/// NUL-terminated strings, padding to the next 8-byte boundary.
pub fn serialize_passwd(p: &Passwd) -> Result<Vec<u8>, Error> {
    // Concatenate all strings and remember where each starts
    let mut data = Vec::with_capacity(
        p.name.len() + p.passwd.len() + p.gecos.len() + p.dir.len() + p.shell.len() + 5,
    );
    data.extend_from_slice(&p.name);
    data.push(0);
    let off_passwd = data.len();
    data.extend_from_slice(&p.passwd);
    data.push(0);
    let off_gecos = data.len();
    data.extend_from_slice(&p.gecos);
    data.push(0);
    let off_dir = data.len();
    data.extend_from_slice(&p.dir);
    data.push(0);
    let off_shell = data.len();
    data.extend_from_slice(&p.shell);
    data.push(0);

    // The intra-record offsets are u16, so the whole data block must fit
    if data.len() > u16::MAX as usize {
        return Err(Error::TooLarge {
            db: "passwd",
            size: data.len(),
            name: lossy(&p.name),
        });
    }

    let mut res = Vec::with_capacity(ENTRY_HEADER_SIZE + data.len() + 7);
    res.extend_from_slice(&p.uid.to_le_bytes());
    res.extend_from_slice(&p.gid.to_le_bytes());
    res.extend_from_slice(&(off_passwd as u16).to_le_bytes());
    res.extend_from_slice(&(off_gecos as u16).to_le_bytes());
    res.extend_from_slice(&(off_dir as u16).to_le_bytes());
    res.extend_from_slice(&(off_shell as u16).to_le_bytes());
    res.extend_from_slice(&(data.len() as u16).to_le_bytes());
    res.extend_from_slice(&data);
    // Keep the leading u64 of the next record 8-byte aligned under mmap
    align_buffer_to(&mut res, 8);
    Ok(res)
}

/// Serialize a passwd database into a complete cache file.
///
/// Emits the records back to back and three indices over them: input
/// order, ascending uid and ascending name (both stable). Duplicate
/// entries are retained, each with its own record and index entries.
pub fn serialize_passwds(pws: &[Passwd]) -> Result<Vec<u8>, Error> {
    let mut data = Vec::new();
    let mut offsets = Vec::with_capacity(pws.len());
    for p in pws {
        offsets.push(data.len() as u64);
        data.extend_from_slice(&serialize_passwd(p)?);
    }

    let index_orig: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();

    let mut by_id: Vec<usize> = (0..pws.len()).collect();
    by_id.sort_by_key(|&i| pws[i].uid);
    let index_id: Vec<u8> = by_id
        .iter()
        .flat_map(|&i| offsets[i].to_le_bytes())
        .collect();

    let mut by_name: Vec<usize> = (0..pws.len()).collect();
    by_name.sort_by(|&a, &b| pws[a].name.cmp(&pws[b].name));
    for w in by_name.windows(2) {
        if pws[w[0]].name == pws[w[1]].name {
            warn!("duplicate passwd entry for {:?}", lossy(&pws[w[0]].name));
        }
    }
    let index_name: Vec<u8> = by_name
        .iter()
        .flat_map(|&i| offsets[i].to_le_bytes())
        .collect();

    format::write_cache(pws.len() as u64, &index_orig, &index_id, &index_name, &data)
}

/// Zero-copy view of one serialized passwd record inside a data region.
#[derive(Debug, Clone, Copy)]
pub struct PasswdEntry<'a> {
    pub uid: u64,
    pub gid: u64,
    pub off_passwd: u16,
    pub off_gecos: u16,
    pub off_dir: u16,
    pub off_shell: u16,
    /// `name\0 passwd\0 gecos\0 home\0 shell\0`; the name starts at 0.
    pub data: &'a [u8],
}

impl<'a> PasswdEntry<'a> {
    /// Decode the record starting at `offset` in the data region.
    /// Returns `None` when the record does not fit the region.
    pub fn parse(region: &'a [u8], offset: u64) -> Option<Self> {
        let base = usize::try_from(offset).ok()?;
        let size = format::read_u16(region, base.checked_add(24)?)? as usize;
        let start = base.checked_add(ENTRY_HEADER_SIZE)?;
        let data = region.get(start..start.checked_add(size)?)?;
        Some(PasswdEntry {
            uid: format::read_u64(region, base)?,
            gid: format::read_u64(region, base + 8)?,
            off_passwd: format::read_u16(region, base + 16)?,
            off_gecos: format::read_u16(region, base + 18)?,
            off_dir: format::read_u16(region, base + 20)?,
            off_shell: format::read_u16(region, base + 22)?,
            data,
        })
    }

    pub fn name(&self) -> &'a [u8] {
        format::cstr_at(self.data, 0)
    }

    /// Decode into an owned record (tests and offline tooling; the NSS
    /// lookup path copies `data` wholesale instead).
    pub fn to_passwd(&self) -> Passwd {
        Passwd {
            name: self.name().to_vec(),
            passwd: format::cstr_at(self.data, self.off_passwd as usize).to_vec(),
            uid: self.uid,
            gid: self.gid,
            gecos: format::cstr_at(self.data, self.off_gecos as usize).to_vec(),
            dir: format::cstr_at(self.data, self.off_dir as usize).to_vec(),
            shell: format::cstr_at(self.data, self.off_shell as usize).to_vec(),
        }
    }
}
