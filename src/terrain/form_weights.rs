use glam::UVec2;

/// Number of blur passes applied to the form weights.
pub const BLUR_PASSES: usize = 2;

/// Per node, per form blend weights in `0..=255`.
pub struct FormWeights {
    size: UVec2,
    form_count: usize,
    weights: Vec<u8>,
}

impl FormWeights {
    /// Weight 255 for the form assigned to each node in `form_map`, 0 for all other forms.
    pub fn one_hot(size: UVec2, form_count: usize, form_map: &[u8]) -> Self {
        debug_assert_eq!(form_map.len(), (size.x * size.y) as usize);

        let mut weights = vec![0_u8; form_map.len() * form_count];
        for (node, &form) in form_map.iter().enumerate() {
            weights[node * form_count + form as usize] = u8::MAX;
        }

        Self {
            size,
            form_count,
            weights,
        }
    }

    /// One-hot weights blurred with [`BLUR_PASSES`] passes.
    pub fn from_form_map(size: UVec2, form_count: usize, form_map: &[u8]) -> Self {
        let mut weights = Self::one_hot(size, form_count, form_map);
        weights.blur(BLUR_PASSES);
        weights
    }

    #[inline]
    pub fn form_count(&self) -> usize {
        self.form_count
    }

    #[inline]
    fn node_index(&self, x: u32, z: u32) -> usize {
        (z * self.size.x + x) as usize
    }

    /// All form weights of one node.
    pub fn weights_at(&self, x: u32, z: u32) -> &[u8] {
        let start = self.node_index(x, z) * self.form_count;
        &self.weights[start..start + self.form_count]
    }

    /// Replace every weight with the truncated average of itself and its existing 4-connected
    /// neighbors. Nodes are updated in place in row-major order, so later nodes already see the
    /// blurred values of earlier ones. The weights of a node do not stay normalized.
    pub fn blur(&mut self, passes: usize) {
        let size = self.size;
        let form_count = self.form_count;

        for _ in 0..passes {
            for z in 0..size.y {
                for x in 0..size.x {
                    let node = self.node_index(x, z);

                    let mut neighbors = [None; 4];
                    if x > 0 {
                        neighbors[0] = Some(node - 1);
                    }
                    if z > 0 {
                        neighbors[1] = Some(node - size.x as usize);
                    }
                    if x + 1 < size.x {
                        neighbors[2] = Some(node + 1);
                    }
                    if z + 1 < size.y {
                        neighbors[3] = Some(node + size.x as usize);
                    }

                    for form in 0..form_count {
                        let mut sum = self.weights[node * form_count + form] as u32;
                        let mut count = 1;
                        for neighbor in neighbors.iter().flatten() {
                            sum += self.weights[neighbor * form_count + form] as u32;
                            count += 1;
                        }
                        self.weights[node * form_count + form] = (sum / count) as u8;
                    }
                }
            }
        }
    }
}
