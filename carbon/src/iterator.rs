use crate::domain::CacheValue;
use crate::ports::Storage;
use shared::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IteratorMode {
    #[default]
    Key,
    KeyValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum IteratorEntry {
    Key(String),
    KeyValue(String, CacheValue),
}

impl IteratorEntry {
    pub fn key(&self) -> &str {
        match self {
            IteratorEntry::Key(key) | IteratorEntry::KeyValue(key, _) => key,
        }
    }
}

/// Walks a fixed list of keys, reading values through the storage in key-value mode.
pub struct KeyListIterator<'a, S: Storage + ?Sized> {
    storage: &'a S,
    keys: Vec<String>,
    position: usize,
    mode: IteratorMode,
}

impl<'a, S: Storage + ?Sized> KeyListIterator<'a, S> {
    pub fn new(storage: &'a S, keys: Vec<String>) -> Self {
        Self {
            storage,
            keys,
            position: 0,
            mode: IteratorMode::default(),
        }
    }

    pub fn mode(&self) -> IteratorMode {
        self.mode
    }

    /// Takes effect from the next entry on
    pub fn set_mode(&mut self, mode: IteratorMode) -> &mut Self {
        self.mode = mode;
        self
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S: Storage + ?Sized> Iterator for KeyListIterator<'_, S> {
    type Item = Result<IteratorEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(key) = self.keys.get(self.position) {
            self.position += 1;
            match self.mode {
                IteratorMode::Key => return Some(Ok(IteratorEntry::Key(key.clone()))),
                IteratorMode::KeyValue => match self.storage.get_item(key) {
                    Ok(response) => {
                        // removed since the key list was taken
                        if let Some(value) = response.into_value() {
                            return Some(Ok(IteratorEntry::KeyValue(key.clone(), value)));
                        }
                    }
                    Err(err) => return Some(Err(err)),
                },
            }
        }
        None
    }
}
