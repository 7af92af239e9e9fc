/// Hands out sequential process ids, e.g. sub-factory numbers `1..=N`.
pub struct ID {
    id: u32,
}

impl ID {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u32) -> Self {
        Self { id: first }
    }

    pub fn get(&mut self) -> u32 {
        let cur_id = self.id;
        self.id += 1;

        cur_id
    }
}

impl Default for ID {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for ID {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        Some(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential() {
        let mut id = ID::starting_at(1);
        assert_eq!(id.get(), 1);
        assert_eq!(id.get(), 2);
        assert_eq!(id.take(3).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ID::new().get(), 0);
    }
}
