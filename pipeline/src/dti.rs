//! Diffusion MRI preprocessing: topup + eddy correction followed by a tensor fit.

use crate::{CatalogLayout, InputRole, Pipeline, Stage};

/// Total readout time line for each phase-encoding direction:
/// 0.001 * 0.69 * (140 - 1) = 0.09591
const ACQPARAMS: &str = "0 -1 0 0.09591\n0 1 0 0.09591";

/// Volumes per phase-encoding direction in each diffusion series.
const VOLUMES_PER_DIRECTION: usize = 100;

const fn role(
    name: &'static str,
    label: &'static str,
    category: &'static str,
    suffix: &'static str,
    required: bool,
) -> InputRole {
    InputRole {
        name,
        label,
        category,
        suffix,
        required,
    }
}

/// BIDS layout: five required images plus bval/bvec sidecars.
pub fn layout() -> CatalogLayout {
    CatalogLayout {
        item_prefix: "sub-",
        roles: vec![
            role("dwi-ap", "DWI AP", "dwi", "dir-ap_run-01_dwi.nii.gz", true),
            role("dwi-pa", "DWI PA", "dwi", "dir-pa_run-01_dwi.nii.gz", true),
            role("fmap-ap", "FMAP AP", "fmap", "acq-dwisefm_dir-ap_run-01_epi.nii.gz", true),
            role("fmap-pa", "FMAP PA", "fmap", "acq-dwisefm_dir-pa_run-01_epi.nii.gz", true),
            role("t1w", "T1w", "anat", "run-01_T1w.nii.gz", true),
            role("bval-ap", "BVAL AP", "dwi", "dir-ap_run-01_dwi.bval", false),
            role("bval-pa", "BVAL PA", "dwi", "dir-pa_run-01_dwi.bval", false),
            role("bvec-ap", "BVEC AP", "dwi", "dir-ap_run-01_dwi.bvec", false),
            role("bvec-pa", "BVEC PA", "dwi", "dir-pa_run-01_dwi.bvec", false),
        ],
        output_target: "dti_fit_data_FA.nii.gz",
    }
}

fn eddy_index() -> String {
    let mut index = vec!["1"; VOLUMES_PER_DIRECTION];
    index.extend(std::iter::repeat("2").take(VOLUMES_PER_DIRECTION));
    index.join(" ")
}

/// The fixed stage list, in execution order.
pub fn pipeline() -> Pipeline {
    Pipeline::new(vec![
        Stage::new("prepare_topup")
            .run("fslmerge", ["-t", "{out}/sbref_APPA", "{fmap-ap}", "{fmap-pa}"])
            .write("{out}/acqparams.txt", ACQPARAMS),
        Stage::new("topup").run(
            "topup",
            [
                "--imain={out}/sbref_APPA",
                "--datain={out}/acqparams.txt",
                "--config=b02b0.cnf",
                "--out={out}/topup_results",
                "--iout={out}/hifi_b0",
            ],
        ),
        Stage::new("prepare_eddy")
            .run("fslmaths", ["{out}/hifi_b0", "-Tmean", "{out}/mean_hifi_b0"])
            .run(
                "bet",
                ["{out}/mean_hifi_b0", "{out}/mean_hifi_b0_brain", "-f", "0.7", "-m"],
            )
            .run("fslmerge", ["-t", "{out}/alldirections_APPA", "{dwi-ap}", "{dwi-pa}"])
            .write("{out}/index.txt", eddy_index())
            .shell("paste -d ' ' {bvec-ap} {bvec-pa} > {out}/BVEC_concat_APPA.bvec")
            .shell("paste -d ' ' {bval-ap} {bval-pa} > {out}/BVAL_concat_APPA.bval"),
        Stage::new("eddy")
            .run(
                "eddy_openmp",
                [
                    "--imain={out}/alldirections_APPA",
                    "--mask={out}/mean_hifi_b0_brain_mask",
                    "--acqp={out}/acqparams.txt",
                    "--index={out}/index.txt",
                    "--bvecs={out}/BVEC_concat_APPA.bvec",
                    "--bvals={out}/BVAL_concat_APPA.bval",
                    "--topup={out}/topup_results",
                    "--repol",
                    "--out={out}/eddy_corrected_data",
                ],
            )
            .hint(
                "eddy failed; the data may have fewer than the expected volumes per direction. \
                 Check whether the subject has two runs.",
            ),
        Stage::new("t1_mask")
            .run(
                "flirt",
                ["-ref", "{out}/mean_hifi_b0", "-in", "{t1w}", "-omat", "{out}/T1w2SBdMRI"],
            )
            .run(
                "bet",
                ["{t1w}", "{out}/T1w_brain", "-f", "0.15", "-m", "-R", "-B"],
            )
            .run(
                "flirt",
                [
                    "-in",
                    "{out}/T1w_brain_mask",
                    "-ref",
                    "{out}/mean_hifi_b0",
                    "-applyxfm",
                    "-init",
                    "{out}/T1w2SBdMRI",
                    "-out",
                    "{out}/T1w_brain_mask_dMRIres",
                ],
            )
            .run(
                "fslmaths",
                [
                    "{out}/T1w_brain_mask_dMRIres",
                    "-dilD",
                    "-kernel",
                    "3D",
                    "{out}/T1w_brain_mask_dMRIres_exp",
                ],
            ),
        Stage::new("dtifit").run(
            "dtifit",
            [
                "-k",
                "{out}/eddy_corrected_data",
                "-o",
                "{out}/dti_fit_data",
                "-m",
                "{out}/T1w_brain_mask_dMRIres_exp",
                "-r",
                "{out}/eddy_corrected_data.eddy_rotated_bvecs",
                "-b",
                "{out}/BVAL_concat_APPA.bval",
            ],
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Step, Vars, OUT_VAR};

    #[test]
    fn test_every_placeholder_is_a_role() {
        let layout = layout();
        let mut vars = Vars::default();
        vars.insert(OUT_VAR, "/o");
        for role in &layout.roles {
            vars.insert(role.name, "/in");
        }
        for stage in pipeline().stages() {
            for step in &stage.steps {
                match step {
                    Step::Run { args, .. } => {
                        for arg in args {
                            vars.render(arg).unwrap();
                        }
                    }
                    Step::Shell(line) => {
                        vars.render_shell(line).unwrap();
                    }
                    Step::Write { file, .. } => {
                        vars.render(file).unwrap();
                    }
                }
            }
        }
    }

    #[test]
    fn test_eddy_index() {
        let index = eddy_index();
        let fields: Vec<&str> = index.split(' ').collect();
        assert_eq!(fields.len(), 2 * VOLUMES_PER_DIRECTION);
        assert_eq!(fields[VOLUMES_PER_DIRECTION - 1], "1");
        assert_eq!(fields[VOLUMES_PER_DIRECTION], "2");
    }

    #[test]
    fn test_dtifit_produces_output_target() {
        let pipeline = pipeline();
        let last = pipeline.stages().last().unwrap();
        assert_eq!(last.name, "dtifit");
        // dtifit writes <prefix>_FA.nii.gz under FSLOUTPUTTYPE=NIFTI_GZ
        assert!(layout().output_target.starts_with("dti_fit_data"));
    }
}
