/// Utility function to view a 3x3 array as a faer matrix 3x3.
///
/// # Arguments
///
/// * `array` - A 3x3 array.
///
/// # Returns
///
/// A faer matrix 3x3 borrowing the array storage.
pub fn array33_to_faer_mat33(array: &[[f64; 3]; 3]) -> faer::MatRef<'_, f64> {
    let array_slice =
        unsafe { std::slice::from_raw_parts(array.as_ptr() as *const f64, array.len() * 3) };
    faer::mat::from_row_major_slice(array_slice, 3, 3)
}

/// Utility function to view a 3x3 array as a mutable faer matrix 3x3.
///
/// # Arguments
///
/// * `array` - A 3x3 array.
///
/// # Returns
///
/// A mutable faer matrix 3x3 borrowing the array storage.
pub fn array33_to_faer_mat33_mut(array: &mut [[f64; 3]; 3]) -> faer::MatMut<'_, f64> {
    let array_slice =
        unsafe { std::slice::from_raw_parts_mut(array.as_mut_ptr() as *mut f64, array.len() * 3) };
    faer::mat::from_row_major_slice_mut(array_slice, 3, 3)
}
