// 4-bit IMA-style ADPCM (3DO "ADP4")
//
// Each input byte carries two codes, high nibble first. The predictor state
// lives for the whole audio track: chunk boundaries can split a run of
// codes anywhere.

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66, 73, 80, 88, 97,
    107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408, 449, 494, 544, 598, 658, 724, 796,
    876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066, 2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871,
    5358, 5894, 6484, 7132, 7845, 8630, 9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623,
    27086, 29794, 32767,
];

const INDEX_ADJUST: [i16; 8] = [-1, -1, -1, -1, 2, 4, 6, 8];

const MAX_STEP_INDEX: i16 = (STEP_TABLE.len() - 1) as i16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdpcmPredictor {
    pub last_sample: i32,
    pub step_index: i16,
}

impl AdpcmPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one 4-bit code and return the new sample.
    pub fn decode_nibble(&mut self, code: u8) -> i16 {
        let step = STEP_TABLE[self.step_index as usize];

        let mut diff = step >> 3;
        if code & 4 != 0 {
            diff += step;
        }
        if code & 2 != 0 {
            diff += step >> 1;
        }
        if code & 1 != 0 {
            diff += step >> 2;
        }

        if code & 8 != 0 {
            self.last_sample -= diff;
        } else {
            self.last_sample += diff;
        }
        self.last_sample = self.last_sample.clamp(i16::MIN as i32, i16::MAX as i32);

        self.step_index = (self.step_index + INDEX_ADJUST[(code & 7) as usize]).clamp(0, MAX_STEP_INDEX);

        self.last_sample as i16
    }

    /// Decode `input` and append two little-endian 16-bit samples per byte
    /// to `out`.
    pub fn decode_into(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(input.len() * 4);
        for &byte in input {
            for code in [byte >> 4, byte & 0x0F] {
                let sample = self.decode_nibble(code);
                out.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }
}
