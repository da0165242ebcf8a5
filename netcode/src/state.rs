//! A named, insertion-ordered sequence of replicated `Value`s (spec §3 "State", §4.4). A State is
//! either read-only (remote-owned mirror) or writable, and may be linked to any number of
//! Connections through distinct StateLinks.

use crate::error::{NetworkError, NetworkResult};
use crate::host::HostHandler;
use crate::state_link::{StateLink, StateLinkId};
use crate::value::Value;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::{Rc, Weak};

pub type StateHandle = Rc<RefCell<State>>;

pub struct State {
    values: Vec<Value>,
    read_only: bool,
    /// Weak back-references used only for invalidation broadcast (spec §9) — the State never
    /// extends a StateLink's lifetime, Connection does.
    links: Vec<Weak<RefCell<StateLink>>>,
}

impl State {
    pub fn new(read_only: bool) -> State {
        State { values: Vec::new(), read_only, links: Vec::new() }
    }

    pub fn new_handle(read_only: bool) -> StateHandle {
        Rc::new(RefCell::new(State::new(read_only)))
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.values.get_mut(index)
    }

    /// Registers a weak back-reference to a StateLink that now mirrors this State. Called by
    /// `Connection` right after it creates the link.
    pub fn register_link(&mut self, link: &Rc<RefCell<StateLink>>) {
        self.links.push(Rc::downgrade(link));
    }

    /// Drops dead weak references opportunistically; call occasionally (e.g. after a link is torn
    /// down) to keep the backing Vec from growing unbounded.
    pub fn prune_dead_links(&mut self) {
        self.links.retain(|link| link.strong_count() > 0);
    }

    /// Appends a value of the given variant. Existing StateLinks retain their dirty-bit arrays
    /// (grown to cover the new index) — additions after a link reaches Up should be rejected by
    /// the caller per spec §4.4.
    pub fn add_value(&mut self, value: Value) -> usize {
        self.values.push(value);
        let count = self.values.len();
        for link in self.links.iter().filter_map(Weak::upgrade) {
            link.borrow_mut().grow(count);
        }
        count - 1
    }

    /// Called by the host when it has locally modified `index`. Runs the variant's change
    /// detection; if significant, marks `index` dirty on every StateLink.
    pub fn value_changed(&mut self, index: usize) -> NetworkResult<()> {
        let value = self.values.get_mut(index).ok_or(NetworkError::InvalidArgument("value index out of range"))?;
        if value.update() {
            self.invalidate_value(index);
        }
        Ok(())
    }

    pub fn invalidate_value(&mut self, index: usize) {
        for link in self.links.iter().filter_map(Weak::upgrade) {
            link.borrow_mut().mark_dirty(index);
        }
    }

    pub fn invalidate_value_except(&mut self, index: usize, except: StateLinkId) {
        for link in self.links.iter().filter_map(Weak::upgrade) {
            if link.borrow().id() != except {
                link.borrow_mut().mark_dirty(index);
            }
        }
    }

    /// Decodes a "link update" value run: `count:u8` entries each `(valueIndex:u16, payload:*)`.
    /// Marks each decoded index dirty on every link except `source`, refreshes `source`'s changed
    /// flag, and notifies the host of each changed index.
    pub fn link_read_values(
        &mut self,
        reader: &mut impl Read,
        source: StateLinkId,
        host: &mut dyn HostHandler,
        state_id: u64,
    ) -> NetworkResult<()> {
        let count = reader.read_u8()?;
        for _ in 0..count {
            let index = reader.read_u16::<LittleEndian>()? as usize;
            let value = self
                .values
                .get_mut(index)
                .ok_or(NetworkError::InvalidProtocolFrame("link update value index out of range"))?;
            value.read(reader)?;
            self.invalidate_value_except(index, source);
            host.state_value_changed(state_id, index);
        }
        for link in self.links.iter().filter_map(Weak::upgrade) {
            if link.borrow().id() == source {
                link.borrow_mut().refresh_changed();
            }
        }
        Ok(())
    }

    /// Decodes one payload per value in order, used during link establishment (no type tags, no
    /// count — the receiver already knows the schema from having created a matching State).
    pub fn link_read_all_values(&mut self, reader: &mut impl Read) -> NetworkResult<()> {
        for value in self.values.iter_mut() {
            value.read(reader)?;
        }
        Ok(())
    }

    /// Decodes a count-prefixed `(type:u8, payload:*)` list, rejecting it outright if the count or
    /// any type tag disagrees with this State's declared schema.
    pub fn link_read_and_verify_all_values(&mut self, reader: &mut impl Read) -> NetworkResult<()> {
        let count = reader.read_u16::<LittleEndian>()? as usize;
        if count != self.values.len() {
            return Err(NetworkError::InvalidProtocolFrame("verify value count does not match schema"));
        }
        for value in self.values.iter_mut() {
            let tag = reader.read_u8()?;
            if tag != value.tag() {
                return Err(NetworkError::InvalidProtocolFrame("verify value type does not match schema"));
            }
            value.read(reader)?;
        }
        Ok(())
    }

    /// Serializes all values in order, with no framing around the run.
    pub fn link_write_values_all(&self, writer: &mut impl Write) -> NetworkResult<()> {
        for value in self.values.iter() {
            value.write(writer)?;
        }
        Ok(())
    }

    /// Serializes all values preceded by `count:u16` and per-value `type:u8`.
    pub fn link_write_values_with_verify(&self, writer: &mut impl Write) -> NetworkResult<()> {
        writer.write_u16::<LittleEndian>(self.values.len() as u16)?;
        for value in self.values.iter() {
            writer.write_u8(value.tag())?;
            value.write(writer)?;
        }
        Ok(())
    }

    /// Serializes only the values dirty for `link`: `changedCount:u8` (clamped to 255), then each
    /// `(valueIndex:u16, payload:*)`, clearing each written bit. Indices beyond 255 stay dirty for
    /// the next tick. Returns the number of indices written.
    pub fn link_write_values_for(&self, writer: &mut impl Write, link: &Rc<RefCell<StateLink>>) -> NetworkResult<usize> {
        let dirty: Vec<usize> = link.borrow().dirty_indices().collect();
        let write_count = dirty.len().min(255);

        writer.write_u8(write_count as u8)?;
        for &index in dirty.iter().take(write_count) {
            writer.write_u16::<LittleEndian>(index as u16)?;
            self.values[index].write(writer)?;
        }

        let mut link_mut = link.borrow_mut();
        for &index in dirty.iter().take(write_count) {
            link_mut.clear_dirty(index);
        }
        Ok(write_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FloatWidth, DEFAULT_EPSILON};
    use std::io::Cursor;

    struct NoopHost;
    impl HostHandler for NoopHost {}

    #[test]
    fn value_changed_marks_all_links_dirty() {
        let state = State::new_handle(false);
        let link1 = Rc::new(RefCell::new(StateLink::new(0, 2, false)));
        let link2 = Rc::new(RefCell::new(StateLink::new(1, 2, false)));
        {
            let mut s = state.borrow_mut();
            s.add_value(Value::new_float(FloatWidth::F32, 0.0, DEFAULT_EPSILON));
            s.add_value(Value::new_float(FloatWidth::F32, 0.0, DEFAULT_EPSILON));
            s.register_link(&link1);
            s.register_link(&link2);
        }

        {
            let mut s = state.borrow_mut();
            if let Some(Value::Float { current, .. }) = s.value_mut(0) {
                *current = 5.0;
            }
            s.value_changed(0).unwrap();
        }

        assert!(link1.borrow().is_dirty(0));
        assert!(link2.borrow().is_dirty(0));
    }

    #[test]
    fn link_write_values_for_clears_bits_and_skips_other_links() {
        let state = State::new_handle(false);
        let link1 = Rc::new(RefCell::new(StateLink::new(0, 1, false)));
        {
            let mut s = state.borrow_mut();
            s.add_value(Value::new_integer(crate::value::IntWidth::W32, crate::value::Signedness::Signed, 42));
            s.register_link(&link1);
        }
        link1.borrow_mut().mark_dirty(0);

        let mut buf = Vec::new();
        {
            let s = state.borrow();
            s.link_write_values_for(&mut buf, &link1).unwrap();
        }
        assert!(!link1.borrow().is_dirty(0));
        assert!(!link1.borrow().changed());
        // changedCount=1, valueIndex=0 (u16 LE), then a 4-byte i32
        assert_eq!(buf, vec![1, 0, 0, 42, 0, 0, 0]);
    }

    #[test]
    fn link_read_values_excludes_source_and_notifies_host() {
        let state = State::new_handle(false);
        let link_source = Rc::new(RefCell::new(StateLink::new(7, 1, false)));
        let link_other = Rc::new(RefCell::new(StateLink::new(8, 1, false)));
        {
            let mut s = state.borrow_mut();
            s.add_value(Value::new_integer(crate::value::IntWidth::W32, crate::value::Signedness::Signed, 0));
            s.register_link(&link_source);
            s.register_link(&link_other);
        }

        let mut payload = Vec::new();
        payload.push(1u8); // count
        payload.extend_from_slice(&0u16.to_le_bytes()); // valueIndex
        payload.extend_from_slice(&99i32.to_le_bytes()); // value

        let mut host = NoopHost;
        let mut reader = Cursor::new(payload.as_slice());
        state.borrow_mut().link_read_values(&mut reader, 7, &mut host, 1).unwrap();

        assert!(!link_source.borrow().is_dirty(0));
        assert!(link_other.borrow().is_dirty(0));
    }

    #[test]
    fn link_read_and_verify_rejects_schema_mismatch() {
        let state = State::new_handle(false);
        state.borrow_mut().add_value(Value::new_integer(crate::value::IntWidth::W32, crate::value::Signedness::Signed, 0));

        let mut payload = Vec::new();
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.push(99); // wrong tag
        payload.extend_from_slice(&0i32.to_le_bytes());

        let mut reader = Cursor::new(payload.as_slice());
        assert!(state.borrow_mut().link_read_and_verify_all_values(&mut reader).is_err());
    }
}
